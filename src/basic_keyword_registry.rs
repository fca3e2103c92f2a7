use std::collections::HashMap;
use crate::basic_types::Token;

/// Registry that defines all BASIC keywords and their corresponding tokens.
/// Keywords are reserved and upper case only. Subprogram names such as CLEAR
/// are deliberately absent: they only mean something after CALL.
pub struct KeywordRegistry {
    keywords: HashMap<&'static str, Token>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        let mut registry = KeywordRegistry {
            keywords: HashMap::new(),
        };
        registry.register_statement_keywords();
        registry.register_command_keywords();
        registry.register_file_keywords();
        registry
    }

    fn register_statement_keywords(&mut self) {
        // REM and DATA carry the raw rest of the line; the lexer fills it in
        self.keywords.insert("REM", Token::Rem(String::new()));
        self.keywords.insert("DATA", Token::Data(String::new()));
        self.keywords.insert("LET", Token::Let);
        self.keywords.insert("PRINT", Token::Print);
        self.keywords.insert("INPUT", Token::Input);
        self.keywords.insert("IF", Token::If);
        self.keywords.insert("THEN", Token::Then);
        self.keywords.insert("ELSE", Token::Else);
        self.keywords.insert("FOR", Token::For);
        self.keywords.insert("TO", Token::To);
        self.keywords.insert("STEP", Token::Step);
        self.keywords.insert("NEXT", Token::Next);
        self.keywords.insert("GOTO", Token::Goto);
        self.keywords.insert("GOSUB", Token::Gosub);
        self.keywords.insert("GO", Token::Go);
        self.keywords.insert("RETURN", Token::Return);
        self.keywords.insert("END", Token::End);
        self.keywords.insert("STOP", Token::Stop);
        self.keywords.insert("READ", Token::Read);
        self.keywords.insert("RESTORE", Token::Restore);
        self.keywords.insert("RANDOMIZE", Token::Randomize);
        self.keywords.insert("DIM", Token::Dim);
        self.keywords.insert("OPTION", Token::Option);
        self.keywords.insert("BASE", Token::Base);
        self.keywords.insert("ON", Token::On);
        self.keywords.insert("DEF", Token::Def);
        self.keywords.insert("CALL", Token::Call);
        self.keywords.insert("BREAK", Token::Break);
        self.keywords.insert("UNBREAK", Token::Unbreak);
        self.keywords.insert("TRACE", Token::Trace);
        self.keywords.insert("UNTRACE", Token::Untrace);
        self.keywords.insert("OPEN", Token::Open);
        self.keywords.insert("CLOSE", Token::Close);
        self.keywords.insert("DELETE", Token::Delete);
        self.keywords.insert("TAB", Token::Tab);
    }

    fn register_command_keywords(&mut self) {
        self.keywords.insert("NEW", Token::New);
        self.keywords.insert("RUN", Token::Run);
        self.keywords.insert("LIST", Token::List);
        self.keywords.insert("BYE", Token::Bye);
        self.keywords.insert("NUMBER", Token::Num);
        self.keywords.insert("NUM", Token::Num);
        self.keywords.insert("RESEQUENCE", Token::Resequence);
        self.keywords.insert("RES", Token::Resequence);
        self.keywords.insert("CONTINUE", Token::Continue);
        self.keywords.insert("CON", Token::Continue);
    }

    fn register_file_keywords(&mut self) {
        self.keywords.insert("DISPLAY", Token::Display);
        self.keywords.insert("INTERNAL", Token::Internal);
        self.keywords.insert("SEQUENTIAL", Token::Sequential);
        self.keywords.insert("RELATIVE", Token::Relative);
        self.keywords.insert("FIXED", Token::Fixed);
        self.keywords.insert("VARIABLE", Token::Variable);
        self.keywords.insert("OUTPUT", Token::Output);
        self.keywords.insert("UPDATE", Token::Update);
        self.keywords.insert("APPEND", Token::Append);
        self.keywords.insert("PERMANENT", Token::Permanent);
    }

    /// Get all keyword names
    pub fn get_keyword_names(&self) -> Vec<&'static str> {
        self.keywords.keys().copied().collect()
    }

    /// Check if a string is a keyword
    pub fn is_keyword(&self, name: &str) -> bool {
        self.keywords.contains_key(name)
    }

    /// Get the token for a keyword
    pub fn get_token_for_keyword(&self, name: &str) -> Option<Token> {
        self.keywords.get(name).cloned()
    }
}

impl Default for KeywordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global singleton instance
lazy_static::lazy_static! {
    pub static ref KEYWORD_REGISTRY: KeywordRegistry = KeywordRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keyword_registry_basic_functionality() {
        let registry = &*KEYWORD_REGISTRY;

        assert!(registry.is_keyword("LET"));
        assert!(registry.is_keyword("PRINT"));
        assert!(!registry.is_keyword("INVALID"));
        assert!(!registry.is_keyword("print"));

        assert_eq!(registry.get_token_for_keyword("LET"), Some(Token::Let));
        assert_eq!(registry.get_token_for_keyword("NUM"), Some(Token::Num));
        assert_eq!(registry.get_token_for_keyword("CON"), Some(Token::Continue));
        assert_eq!(registry.get_token_for_keyword("INVALID"), None);
    }

    #[test]
    fn test_subprogram_names_are_not_reserved() {
        let registry = &*KEYWORD_REGISTRY;
        for name in ["CLEAR", "KEY", "JOYST", "SCREEN", "COLOR", "CHAR", "HCHAR", "VCHAR", "GCHAR", "SOUND"] {
            assert!(!registry.is_keyword(name), "{} should not be reserved", name);
        }
    }

    #[test]
    fn test_all_keywords_present() {
        let keywords = KEYWORD_REGISTRY.get_keyword_names();
        let expected = vec![
            "REM", "LET", "PRINT", "INPUT", "IF", "THEN", "ELSE", "FOR", "TO", "STEP", "NEXT",
            "GOTO", "GOSUB", "RETURN", "END", "STOP", "DATA", "READ", "RESTORE", "DIM", "ON",
            "DEF", "RANDOMIZE", "CALL", "BREAK", "UNBREAK", "TRACE", "UNTRACE",
        ];

        for expected_keyword in expected {
            assert!(keywords.contains(&expected_keyword), "Missing keyword: {}", expected_keyword);
        }
    }
}
