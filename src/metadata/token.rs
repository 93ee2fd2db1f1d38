//! Metadata tokens.
//!
//! A token is the 32-bit handle CIL uses to reference metadata rows: the high byte
//! selects the table, the low 24 bits are the 1-based row index. Instruction operands
//! (`call`, `ldsfld`, `castclass`, `ldstr`, ...) carry tokens, and every reference the
//! resolver follows starts from one.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Table id of the `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// Table id of the `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// Table id of the `Field` table
    pub const FIELD: u8 = 0x04;
    /// Table id of the `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// Table id of the `MemberRef` table
    pub const MEMBER_REF: u8 = 0x0A;
    /// Table id of the `ModuleRef` table
    pub const MODULE_REF: u8 = 0x1A;
    /// Table id of the `TypeSpec` table
    pub const TYPE_SPEC: u8 = 0x1B;
    /// Table id of the `AssemblyRef` table
    pub const ASSEMBLY_REF: u8 = 0x23;
    /// Table id of the `MethodSpec` table
    pub const METHOD_SPEC: u8 = 0x2B;
    /// Pseudo table id of the `#US` heap (`ldstr` operands)
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a 1-based row index
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns the 0-based index of the row, or `None` for a nil row
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        (self.row() as usize).checked_sub(1)
    }

    /// Returns true if this token points into `table`
    #[must_use]
    pub fn is_table(&self, table: u8) -> bool {
        self.table() == table
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_table_and_row() {
        let token = Token(0x06000001);
        assert_eq!(token.table(), Token::METHOD_DEF);
        assert_eq!(token.row(), 1);

        let token = Token(0x06FFFFFF);
        assert_eq!(token.row(), 0x00FFFFFF);
    }

    #[test]
    fn test_token_from_parts() {
        let token = Token::from_parts(Token::MEMBER_REF, 4);
        assert_eq!(token.value(), 0x0A000004);
        assert!(token.is_table(Token::MEMBER_REF));
        assert!(!token.is_table(Token::METHOD_DEF));
    }

    #[test]
    fn test_token_index() {
        assert_eq!(Token(0x02000001).index(), Some(0));
        assert_eq!(Token(0x02000010).index(), Some(15));
        assert_eq!(Token(0x02000000).index(), None);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0x00000000).is_null());
        assert!(!Token(0x06000001).is_null());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x06000001)), "0x06000001");
        let debug_str = format!("{:?}", Token(0x2B000003));
        assert!(debug_str.contains("table: 0x2b"));
        assert!(debug_str.contains("row: 3"));
    }

    #[test]
    fn test_token_hash() {
        let mut map = HashMap::new();
        map.insert(Token(0x06000001), "Decrypt");
        map.insert(Token(0x06000002), "Init");

        assert_eq!(map.get(&Token(0x06000001)), Some(&"Decrypt"));
        assert_eq!(map.get(&Token(0x06000003)), None);
    }
}
