use indexmap::IndexMap;

use crate::block::{BlockBody, OutputBinding, parse_output};
use crate::keyword::{CipherMode, HashAlgorithm, Keyword, PaddingMode, keywords};
use crate::parser::error::ParseError;
use crate::parser::token::{TokenKind, TokenStream};
use crate::writer::BlockWriter;

keywords! {
    /// Names of every function, as written after `FUNCTION`.
    pub enum FunctionKind {
        Constant => "Constant",
        Base64Encode => "Base64Encode",
        Base64Decode => "Base64Decode",
        Hash => "Hash",
        Hmac => "HMAC",
        Translate => "Translate",
        DateToUnixTime => "DateToUnixTime",
        Length => "Length",
        ToLowercase => "ToLowercase",
        ToUppercase => "ToUppercase",
        Replace => "Replace",
        RegexMatch => "RegexMatch",
        UrlEncode => "URLEncode",
        UrlDecode => "URLDecode",
        Unescape => "Unescape",
        HtmlEntityEncode => "HTMLEntityEncode",
        HtmlEntityDecode => "HTMLEntityDecode",
        UnixTimeToDate => "UnixTimeToDate",
        CurrentUnixTime => "CurrentUnixTime",
        UnixTimeToIso8601 => "UnixTimeToISO8601",
        RandomNum => "RandomNum",
        RandomString => "RandomString",
        Ceil => "Ceil",
        Floor => "Floor",
        Round => "Round",
        Compute => "Compute",
        CountOccurrences => "CountOccurrences",
        ClearCookies => "ClearCookies",
        RsaEncrypt => "RSAEncrypt",
        RsaDecrypt => "RSADecrypt",
        Delay => "Delay",
        CharAt => "CharAt",
        Substring => "Substring",
        ReverseString => "ReverseString",
        Trim => "Trim",
        GetRandomUa => "GetRandomUA",
        AesEncrypt => "AESEncrypt",
        AesDecrypt => "AESDecrypt",
        Pbkdf2Pkcs5 => "PBKDF2PKCS5",
    }
}

// Declared defaults. Flags equal to these are elided when serializing.
pub const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::Sha512;
pub const DEFAULT_HMAC_BASE64: bool = false;
pub const DEFAULT_STOP_AFTER_FIRST_MATCH: bool = true;
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd:HH-mm-ss";
pub const DEFAULT_USE_REGEX: bool = false;
pub const DEFAULT_RSA_OAEP: bool = true;
pub const DEFAULT_KDF_SALT_SIZE: u32 = 8;
pub const DEFAULT_KDF_ITERATIONS: u32 = 1;
pub const DEFAULT_KDF_KEY_SIZE: u32 = 16;
pub const DEFAULT_KDF_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha1;

/// Parameters shared by RSAEncrypt and RSADecrypt. All strings are templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaParams {
    /// Private key, base64.
    pub key: String,
    /// Public key modulus, base64.
    pub modulus: String,
    /// Public key exponent, base64.
    pub exponent: String,
    /// OAEP padding instead of PKCS#1 v1.5.
    pub oaep: bool,
}

impl Default for RsaParams {
    fn default() -> Self {
        RsaParams {
            key: String::new(),
            modulus: String::new(),
            exponent: String::new(),
            oaep: DEFAULT_RSA_OAEP,
        }
    }
}

/// Parameters shared by AESEncrypt and AESDecrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesParams {
    /// Key, base64 template.
    pub key: String,
    /// Initialization vector, base64 template.
    pub iv: String,
    pub mode: CipherMode,
    pub padding: PaddingMode,
}

impl Default for AesParams {
    fn default() -> Self {
        AesParams {
            key: String::new(),
            iv: String::new(),
            mode: CipherMode::Cbc,
            padding: PaddingMode::None,
        }
    }
}

/// Salt for PBKDF2: either given (base64 template) or generated with a size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfSalt {
    Fixed(String),
    Random(u32),
}

/// A function together with its kind-specific arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Constant,
    Base64Encode,
    Base64Decode,
    Hash {
        algorithm: HashAlgorithm,
    },
    Hmac {
        algorithm: HashAlgorithm,
        key: String,
        base64: bool,
    },
    Translate {
        stop_after_first_match: bool,
        dictionary: IndexMap<String, String>,
    },
    DateToUnixTime {
        format: String,
    },
    Length,
    ToLowercase,
    ToUppercase,
    Replace {
        what: String,
        with: String,
        use_regex: bool,
    },
    RegexMatch {
        pattern: String,
    },
    UrlEncode,
    UrlDecode,
    Unescape,
    HtmlEntityEncode,
    HtmlEntityDecode,
    UnixTimeToDate,
    CurrentUnixTime,
    UnixTimeToIso8601,
    RandomNum {
        min: i64,
        max: i64,
    },
    RandomString,
    Ceil,
    Floor,
    Round,
    Compute,
    CountOccurrences {
        needle: String,
    },
    ClearCookies,
    RsaEncrypt(RsaParams),
    RsaDecrypt(RsaParams),
    Delay,
    CharAt {
        index: String,
    },
    Substring {
        index: String,
        length: String,
    },
    ReverseString,
    Trim,
    GetRandomUa,
    AesEncrypt(AesParams),
    AesDecrypt(AesParams),
    Pbkdf2Pkcs5 {
        salt: KdfSalt,
        iterations: u32,
        key_size: u32,
        algorithm: HashAlgorithm,
    },
}

impl Function {
    /// The function of `kind` with every argument at its default.
    pub fn new(kind: FunctionKind) -> Self {
        match kind {
            FunctionKind::Constant => Function::Constant,
            FunctionKind::Base64Encode => Function::Base64Encode,
            FunctionKind::Base64Decode => Function::Base64Decode,
            FunctionKind::Hash => Function::Hash { algorithm: DEFAULT_HASH },
            FunctionKind::Hmac => Function::Hmac {
                algorithm: DEFAULT_HASH,
                key: String::new(),
                base64: DEFAULT_HMAC_BASE64,
            },
            FunctionKind::Translate => Function::Translate {
                stop_after_first_match: DEFAULT_STOP_AFTER_FIRST_MATCH,
                dictionary: IndexMap::new(),
            },
            FunctionKind::DateToUnixTime => Function::DateToUnixTime {
                format: DEFAULT_DATE_FORMAT.to_string(),
            },
            FunctionKind::Length => Function::Length,
            FunctionKind::ToLowercase => Function::ToLowercase,
            FunctionKind::ToUppercase => Function::ToUppercase,
            FunctionKind::Replace => Function::Replace {
                what: String::new(),
                with: String::new(),
                use_regex: DEFAULT_USE_REGEX,
            },
            FunctionKind::RegexMatch => Function::RegexMatch { pattern: String::new() },
            FunctionKind::UrlEncode => Function::UrlEncode,
            FunctionKind::UrlDecode => Function::UrlDecode,
            FunctionKind::Unescape => Function::Unescape,
            FunctionKind::HtmlEntityEncode => Function::HtmlEntityEncode,
            FunctionKind::HtmlEntityDecode => Function::HtmlEntityDecode,
            FunctionKind::UnixTimeToDate => Function::UnixTimeToDate,
            FunctionKind::CurrentUnixTime => Function::CurrentUnixTime,
            FunctionKind::UnixTimeToIso8601 => Function::UnixTimeToIso8601,
            FunctionKind::RandomNum => Function::RandomNum { min: 0, max: 0 },
            FunctionKind::RandomString => Function::RandomString,
            FunctionKind::Ceil => Function::Ceil,
            FunctionKind::Floor => Function::Floor,
            FunctionKind::Round => Function::Round,
            FunctionKind::Compute => Function::Compute,
            FunctionKind::CountOccurrences => Function::CountOccurrences { needle: String::new() },
            FunctionKind::ClearCookies => Function::ClearCookies,
            FunctionKind::RsaEncrypt => Function::RsaEncrypt(RsaParams::default()),
            FunctionKind::RsaDecrypt => Function::RsaDecrypt(RsaParams::default()),
            FunctionKind::Delay => Function::Delay,
            FunctionKind::CharAt => Function::CharAt { index: "0".to_string() },
            FunctionKind::Substring => Function::Substring {
                index: "0".to_string(),
                length: "1".to_string(),
            },
            FunctionKind::ReverseString => Function::ReverseString,
            FunctionKind::Trim => Function::Trim,
            FunctionKind::GetRandomUa => Function::GetRandomUa,
            FunctionKind::AesEncrypt => Function::AesEncrypt(AesParams::default()),
            FunctionKind::AesDecrypt => Function::AesDecrypt(AesParams::default()),
            FunctionKind::Pbkdf2Pkcs5 => Function::Pbkdf2Pkcs5 {
                salt: KdfSalt::Random(DEFAULT_KDF_SALT_SIZE),
                iterations: DEFAULT_KDF_ITERATIONS,
                key_size: DEFAULT_KDF_KEY_SIZE,
                algorithm: DEFAULT_KDF_ALGORITHM,
            },
        }
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            Function::Constant => FunctionKind::Constant,
            Function::Base64Encode => FunctionKind::Base64Encode,
            Function::Base64Decode => FunctionKind::Base64Decode,
            Function::Hash { .. } => FunctionKind::Hash,
            Function::Hmac { .. } => FunctionKind::Hmac,
            Function::Translate { .. } => FunctionKind::Translate,
            Function::DateToUnixTime { .. } => FunctionKind::DateToUnixTime,
            Function::Length => FunctionKind::Length,
            Function::ToLowercase => FunctionKind::ToLowercase,
            Function::ToUppercase => FunctionKind::ToUppercase,
            Function::Replace { .. } => FunctionKind::Replace,
            Function::RegexMatch { .. } => FunctionKind::RegexMatch,
            Function::UrlEncode => FunctionKind::UrlEncode,
            Function::UrlDecode => FunctionKind::UrlDecode,
            Function::Unescape => FunctionKind::Unescape,
            Function::HtmlEntityEncode => FunctionKind::HtmlEntityEncode,
            Function::HtmlEntityDecode => FunctionKind::HtmlEntityDecode,
            Function::UnixTimeToDate => FunctionKind::UnixTimeToDate,
            Function::CurrentUnixTime => FunctionKind::CurrentUnixTime,
            Function::UnixTimeToIso8601 => FunctionKind::UnixTimeToIso8601,
            Function::RandomNum { .. } => FunctionKind::RandomNum,
            Function::RandomString => FunctionKind::RandomString,
            Function::Ceil => FunctionKind::Ceil,
            Function::Floor => FunctionKind::Floor,
            Function::Round => FunctionKind::Round,
            Function::Compute => FunctionKind::Compute,
            Function::CountOccurrences { .. } => FunctionKind::CountOccurrences,
            Function::ClearCookies => FunctionKind::ClearCookies,
            Function::RsaEncrypt(_) => FunctionKind::RsaEncrypt,
            Function::RsaDecrypt(_) => FunctionKind::RsaDecrypt,
            Function::Delay => FunctionKind::Delay,
            Function::CharAt { .. } => FunctionKind::CharAt,
            Function::Substring { .. } => FunctionKind::Substring,
            Function::ReverseString => FunctionKind::ReverseString,
            Function::Trim => FunctionKind::Trim,
            Function::GetRandomUa => FunctionKind::GetRandomUa,
            Function::AesEncrypt(_) => FunctionKind::AesEncrypt,
            Function::AesDecrypt(_) => FunctionKind::AesDecrypt,
            Function::Pbkdf2Pkcs5 { .. } => FunctionKind::Pbkdf2Pkcs5,
        }
    }

    /// Parse the arguments that follow the function name.
    fn parse_arguments(kind: FunctionKind, tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let function = match kind {
            FunctionKind::Hash => Function::Hash {
                algorithm: tokens.expect_enum("Hash Type")?,
            },
            FunctionKind::Hmac => {
                let algorithm = tokens.expect_enum("Hash Type")?;
                let key = tokens.expect_literal("HMAC Key")?;
                let mut base64 = DEFAULT_HMAC_BASE64;
                tokens.read_flags(&mut [("HmacBase64", &mut base64)])?;
                Function::Hmac { algorithm, key, base64 }
            }
            FunctionKind::Translate => {
                let mut stop_after_first_match = DEFAULT_STOP_AFTER_FIRST_MATCH;
                tokens.read_flags(&mut [("StopAfterFirstMatch", &mut stop_after_first_match)])?;
                let mut dictionary = IndexMap::new();
                while tokens.peek_kind() == Some(TokenKind::Parameter) {
                    tokens.expect_keyword("KEY")?;
                    let key = tokens.expect_literal("Key")?;
                    tokens.expect_keyword("VALUE")?;
                    let value = tokens.expect_literal("Value")?;
                    dictionary.insert(key, value);
                }
                Function::Translate { stop_after_first_match, dictionary }
            }
            FunctionKind::DateToUnixTime => Function::DateToUnixTime {
                format: tokens.expect_literal("Date Format")?,
            },
            FunctionKind::Replace => {
                let what = tokens.expect_literal("What")?;
                let with = tokens.expect_literal("With")?;
                let mut use_regex = DEFAULT_USE_REGEX;
                tokens.read_flags(&mut [("UseRegex", &mut use_regex)])?;
                Function::Replace { what, with, use_regex }
            }
            FunctionKind::RegexMatch => Function::RegexMatch {
                pattern: tokens.expect_literal("Pattern")?,
            },
            FunctionKind::RandomNum => Function::RandomNum {
                min: tokens.expect_integer("Minimum")?,
                max: tokens.expect_integer("Maximum")?,
            },
            FunctionKind::CountOccurrences => Function::CountOccurrences {
                needle: tokens.expect_literal("String to find")?,
            },
            FunctionKind::CharAt => Function::CharAt {
                index: tokens.expect_literal("Index")?,
            },
            FunctionKind::Substring => Function::Substring {
                index: tokens.expect_literal("Index")?,
                length: tokens.expect_literal("Length")?,
            },
            FunctionKind::RsaEncrypt | FunctionKind::RsaDecrypt => {
                let key = tokens.expect_literal("Private Key")?;
                let modulus = tokens.expect_literal("Public Key Modulus")?;
                let exponent = tokens.expect_literal("Public Key Exponent")?;
                let mut oaep = DEFAULT_RSA_OAEP;
                tokens.read_flags(&mut [("RsaOAEP", &mut oaep)])?;
                let params = RsaParams { key, modulus, exponent, oaep };
                if kind == FunctionKind::RsaEncrypt {
                    Function::RsaEncrypt(params)
                } else {
                    Function::RsaDecrypt(params)
                }
            }
            FunctionKind::AesEncrypt | FunctionKind::AesDecrypt => {
                let params = AesParams {
                    key: tokens.expect_literal("Key")?,
                    iv: tokens.expect_literal("IV")?,
                    mode: tokens.expect_enum("Cipher Mode")?,
                    padding: tokens.expect_enum("Padding Mode")?,
                };
                if kind == FunctionKind::AesEncrypt {
                    Function::AesEncrypt(params)
                } else {
                    Function::AesDecrypt(params)
                }
            }
            FunctionKind::Pbkdf2Pkcs5 => {
                let salt = match tokens.optional_literal() {
                    Some(salt) => KdfSalt::Fixed(salt),
                    None => KdfSalt::Random(tokens.expect_count("Salt Size")?),
                };
                Function::Pbkdf2Pkcs5 {
                    salt,
                    iterations: tokens.expect_count("Iterations")?,
                    key_size: tokens.expect_count("Key Size")?,
                    algorithm: tokens.expect_enum("Algorithm")?,
                }
            }
            // Everything else takes no arguments.
            other => Function::new(other),
        };
        Ok(function)
    }

    fn write_arguments(&self, w: &mut BlockWriter) {
        match self {
            Function::Hash { algorithm } => {
                w.token(algorithm);
            }
            Function::Hmac { algorithm, key, base64 } => {
                w.token(algorithm)
                    .literal(key)
                    .flag("HmacBase64", *base64, DEFAULT_HMAC_BASE64);
            }
            Function::Translate { stop_after_first_match, dictionary } => {
                w.flag("StopAfterFirstMatch", *stop_after_first_match, DEFAULT_STOP_AFTER_FIRST_MATCH);
                for (key, value) in dictionary {
                    w.indent().token("KEY").literal(key).token("VALUE").literal(value);
                }
                w.indent();
            }
            Function::DateToUnixTime { format } => {
                w.literal(format);
            }
            Function::Replace { what, with, use_regex } => {
                w.literal(what)
                    .literal(with)
                    .flag("UseRegex", *use_regex, DEFAULT_USE_REGEX);
            }
            Function::RegexMatch { pattern } => {
                w.literal(pattern);
            }
            Function::RandomNum { min, max } => {
                w.integer(*min).integer(*max);
            }
            Function::CountOccurrences { needle } => {
                w.literal(needle);
            }
            Function::CharAt { index } => {
                w.literal(index);
            }
            Function::Substring { index, length } => {
                w.literal(index).literal(length);
            }
            Function::RsaEncrypt(params) | Function::RsaDecrypt(params) => {
                w.literal(&params.key)
                    .literal(&params.modulus)
                    .literal(&params.exponent)
                    .flag("RsaOAEP", params.oaep, DEFAULT_RSA_OAEP);
            }
            Function::AesEncrypt(params) | Function::AesDecrypt(params) => {
                w.literal(&params.key)
                    .literal(&params.iv)
                    .token(params.mode)
                    .token(params.padding);
            }
            Function::Pbkdf2Pkcs5 { salt, iterations, key_size, algorithm } => {
                match salt {
                    KdfSalt::Fixed(salt) => w.literal(salt),
                    KdfSalt::Random(size) => w.integer(*size),
                };
                w.integer(*iterations).integer(*key_size).token(algorithm);
            }
            Function::Constant
            | Function::Base64Encode
            | Function::Base64Decode
            | Function::Length
            | Function::ToLowercase
            | Function::ToUppercase
            | Function::UrlEncode
            | Function::UrlDecode
            | Function::Unescape
            | Function::HtmlEntityEncode
            | Function::HtmlEntityDecode
            | Function::UnixTimeToDate
            | Function::CurrentUnixTime
            | Function::UnixTimeToIso8601
            | Function::RandomString
            | Function::Ceil
            | Function::Floor
            | Function::Round
            | Function::Compute
            | Function::ClearCookies
            | Function::Delay
            | Function::ReverseString
            | Function::Trim
            | Function::GetRandomUa => {}
        }
    }
}

/// `FUNCTION <Name> [arguments] ["input"] [-> VAR|CAP "name"]`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBlock {
    pub function: Function,
    /// Input template; fanned out over list references at execution time.
    pub input: String,
    pub output: Option<OutputBinding>,
}

impl FunctionBlock {
    pub fn new(function: Function) -> Self {
        FunctionBlock {
            function,
            input: String::new(),
            output: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_output(mut self, output: OutputBinding) -> Self {
        self.output = Some(output);
        self
    }
}

impl BlockBody for FunctionBlock {
    const KEYWORD: &'static str = "FUNCTION";

    fn parse_body(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let kind: FunctionKind = tokens.expect_enum("Function Name")?;
        let function = Function::parse_arguments(kind, tokens)?;
        let input = tokens.optional_literal().unwrap_or_default();
        let output = parse_output(tokens)?;
        Ok(FunctionBlock { function, input, output })
    }

    fn write_body(&self, w: &mut BlockWriter) {
        w.token(self.function.kind().name());
        self.function.write_arguments(w);
        w.literal_unless(&self.input, "");
        w.output(self.output.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};

    fn parse_function(text: &str) -> FunctionBlock {
        match Block::parse(text).expect("parse failed").kind {
            BlockKind::Function(f) => f,
            other => panic!("expected function block, got {:?}", other),
        }
    }

    #[test]
    fn missing_function_name() {
        let err = Block::parse("FUNCTION").unwrap_err();
        assert_eq!(err.message, "expected Function Name");
    }

    #[test]
    fn missing_mandatory_literal() {
        let err = Block::parse("FUNCTION Replace \"a\"").unwrap_err();
        assert_eq!(err.message, "expected With");
    }

    #[test]
    fn optional_input_and_output_absent() {
        let f = parse_function("FUNCTION CurrentUnixTime");
        assert_eq!(f.function, Function::CurrentUnixTime);
        assert_eq!(f.input, "");
        assert_eq!(f.output, None);
    }

    #[test]
    fn hmac_flag_and_key() {
        let f = parse_function(r#"FUNCTION HMAC SHA256 "k<K>" HmacBase64=True "msg" -> VAR "sig""#);
        assert_eq!(
            f.function,
            Function::Hmac {
                algorithm: HashAlgorithm::Sha256,
                key: "k<K>".into(),
                base64: true,
            }
        );
        assert_eq!(f.input, "msg");
        assert_eq!(f.output, Some(OutputBinding::var("sig")));
    }

    #[test]
    fn translate_dictionary_keeps_order() {
        let f = parse_function(
            "FUNCTION Translate StopAfterFirstMatch=False\n  KEY \"b\" VALUE \"2\"\n  KEY \"a\" VALUE \"1\"\n  \"ab\"",
        );
        let Function::Translate { stop_after_first_match, dictionary } = f.function else {
            panic!("expected translate");
        };
        assert!(!stop_after_first_match);
        assert_eq!(dictionary.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(f.input, "ab");
    }

    #[test]
    fn translate_requires_key_keyword() {
        let err = Block::parse(r#"FUNCTION Translate KY "a" VALUE "b""#).unwrap_err();
        assert_eq!(err.message, "expected KEY");
    }

    #[test]
    fn pbkdf2_salt_forms() {
        let fixed = parse_function(r#"FUNCTION PBKDF2PKCS5 "c2FsdA==" 1000 32 SHA256 "pw""#);
        assert_eq!(
            fixed.function,
            Function::Pbkdf2Pkcs5 {
                salt: KdfSalt::Fixed("c2FsdA==".into()),
                iterations: 1000,
                key_size: 32,
                algorithm: HashAlgorithm::Sha256,
            }
        );

        let random = parse_function("FUNCTION PBKDF2PKCS5 16 1 16 SHA1");
        assert!(matches!(
            random.function,
            Function::Pbkdf2Pkcs5 { salt: KdfSalt::Random(16), .. }
        ));
    }

    #[test]
    fn negative_kdf_count_is_rejected() {
        let err = Block::parse("FUNCTION PBKDF2PKCS5 8 -1 16 SHA1").unwrap_err();
        assert!(err.message.contains("Iterations"));
    }

    #[test]
    fn enum_names_are_case_insensitive_and_canonicalized() {
        let block = Block::parse(r#"function hash sha256 "abc""#).unwrap();
        assert_eq!(block.serialize(false), r#"FUNCTION Hash SHA256 "abc""#);
    }

    #[test]
    fn unknown_enum_value_lists_options() {
        let err = Block::parse(r#"FUNCTION Hash SHA3 "abc""#).unwrap_err();
        assert!(err.message.contains("SHA3"));
        assert!(err.notes[0].contains("SHA256"));
    }

    #[test]
    fn every_kind_has_a_default_with_the_same_kind() {
        for kind in FunctionKind::ALL {
            assert_eq!(Function::new(*kind).kind(), *kind);
        }
    }
}
