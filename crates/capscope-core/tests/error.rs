//! Tests for error handling

use std::io;

use capscope_core::error::{CapscopeError, Result};

#[test]
fn test_mapping_provider_message()
{
    let error = CapscopeError::MappingProvider("procstat not found".to_string());
    assert_eq!(error.to_string(), "Unable to load mappings: procstat not found");
}

#[test]
fn test_symbol_provider_message_names_the_image()
{
    let error = CapscopeError::SymbolProvider {
        path: "/usr/lib/libc.so.7".into(),
        details: "nm produced no symbols".to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("/usr/lib/libc.so.7"));
    assert!(message.contains("nm produced no symbols"));
}

#[test]
fn test_parse_message_has_line_number()
{
    let error = CapscopeError::Parse {
        line: 12,
        details: "expected start-end".to_string(),
    };
    assert_eq!(error.to_string(), "Parse error on line 12: expected start-end");
}

#[test]
fn test_resource_exhausted_message()
{
    let error = CapscopeError::ResourceExhausted("visited set exceeds 8192 ranges".to_string());
    assert!(error.to_string().starts_with("Resource exhausted"));
}

#[test]
fn test_io_error_conversion()
{
    fn open() -> Result<()>
    {
        Err(io::Error::new(io::ErrorKind::NotFound, "gone"))?;
        Ok(())
    }

    assert!(matches!(open(), Err(CapscopeError::Io(_))));
}
