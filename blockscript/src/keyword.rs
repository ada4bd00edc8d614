//! Closed enumerations that appear as bare words in scripts.

/// A fieldless enum whose variants are written as bare words.
///
/// Lookup is case-insensitive; `name` is the canonical spelling the
/// serializer writes back.
pub trait Keyword: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn from_name(word: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(word))
    }
}

macro_rules! keywords {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::keyword::Keyword for $name {
            const ALL: &'static [Self] = &[ $( $name::$variant ),+ ];

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::keyword::Keyword::name(*self))
            }
        }
    };
}

pub(crate) use keywords;

keywords! {
    /// Digest algorithms for Hash, HMAC and PBKDF2.
    pub enum HashAlgorithm {
        Md4 => "MD4",
        Md5 => "MD5",
        Sha1 => "SHA1",
        Sha256 => "SHA256",
        Sha384 => "SHA384",
        Sha512 => "SHA512",
    }
}

keywords! {
    /// Block cipher modes accepted by AESEncrypt / AESDecrypt.
    pub enum CipherMode {
        Cbc => "CBC",
        Ecb => "ECB",
        Ofb => "OFB",
        Cfb => "CFB",
        Cts => "CTS",
    }
}

keywords! {
    pub enum PaddingMode {
        None => "None",
        Pkcs7 => "PKCS7",
        Zeros => "Zeros",
        AnsiX923 => "ANSIX923",
        Iso10126 => "ISO10126",
    }
}

keywords! {
    /// Comparison operators shared by every block that tests a condition.
    pub enum Comparer {
        LessThan => "LessThan",
        LessThanOrEqual => "LessThanOrEqual",
        GreaterThan => "GreaterThan",
        GreaterThanOrEqual => "GreaterThanOrEqual",
        EqualTo => "EqualTo",
        NotEqualTo => "NotEqualTo",
        Contains => "Contains",
        DoesNotContain => "DoesNotContain",
        Exists => "Exists",
        DoesNotExist => "DoesNotExist",
        MatchesRegex => "MatchesRegex",
        DoesNotMatchRegex => "DoesNotMatchRegex",
    }
}

keywords! {
    /// Byte encodings understood by the Conversion utility.
    pub enum Encoding {
        Hex => "HEX",
        Bin => "BIN",
        Base64 => "BASE64",
        Ascii => "ASCII",
        Utf8 => "UTF8",
        /// UTF-16, little endian.
        Unicode => "UNICODE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(HashAlgorithm::from_name("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(PaddingMode::from_name("NONE"), Some(PaddingMode::None));
        assert_eq!(Encoding::from_name("nope"), None);
    }

    #[test]
    fn display_is_canonical_name() {
        assert_eq!(Comparer::DoesNotMatchRegex.to_string(), "DoesNotMatchRegex");
        assert_eq!(CipherMode::Cbc.to_string(), "CBC");
    }
}
