//! Identifier validation and quoting for SQL Server statements.
//!
//! Table and column names cannot be sent as parameters, so every identifier
//! that ends up in SQL text goes through this module. Names coming from entity
//! metadata are bracket-quoted. Names supplied by callers at runtime are either
//! restricted to letters ([`validate_letters_only`]) or validated and quoted,
//! depending on the configured [`IdentifierPolicy`](crate::config::IdentifierPolicy).

use crate::config::IdentifierPolicy;
use crate::error::{DalError, Result};

/// SQL Server `sysname` limit.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is quoted.
///
/// Rejects empty names, names containing NUL and names over 128 characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DalError::Validation(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(DalError::Validation(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LENGTH {
        return Err(DalError::Validation(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, len, name
        )));
    }

    Ok(())
}

/// Accept only names made entirely of letters.
///
/// Digits, underscores, spaces and punctuation are all rejected.
pub fn validate_letters_only(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(char::is_alphabetic) {
        return Err(DalError::Validation(format!(
            "Only letters are allowed in identifier {:?}",
            name
        )));
    }
    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// Closing brackets inside the name are doubled.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a table name with its schema: `[schema].[table]`.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

/// Check and quote a caller-supplied identifier under the given policy.
pub fn guard_identifier(name: &str, policy: IdentifierPolicy) -> Result<String> {
    match policy {
        IdentifierPolicy::LettersOnly => {
            validate_letters_only(name)?;
            quote_mssql(name)
        }
        IdentifierPolicy::Quoted => quote_mssql(name),
    }
}

/// Validate an explicit column type such as `nvarchar(200)` or `decimal(18, 4)`.
///
/// The type name must start with a letter and hold only letters, digits and
/// spaces. It may be followed by one parenthesized list of up to two numbers,
/// the first of which may be `max`.
pub fn validate_sql_type(sql_type: &str) -> Result<()> {
    let invalid = || DalError::Validation(format!("Invalid SQL type {:?}", sql_type));

    let trimmed = sql_type.trim();
    let (name, args) = match trimmed.find('(') {
        Some(open) => {
            let rest = trimmed[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
            (&trimmed[..open], Some(rest))
        }
        None => (trimmed, None),
    };

    let name = name.trim_end();
    if name.is_empty()
        || !name.starts_with(|c: char| c.is_ascii_alphabetic())
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
    {
        return Err(invalid());
    }

    if let Some(args) = args {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if parts.len() > 2 {
            return Err(invalid());
        }
        for (i, part) in parts.iter().enumerate() {
            let is_number = !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
            let is_max = i == 0 && part.eq_ignore_ascii_case("max");
            if !is_number && !is_max {
                return Err(invalid());
            }
        }
    }

    Ok(())
}
