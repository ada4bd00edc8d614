use blockscript::Parser;
use blockscript::block::function::{Function, FunctionBlock, FunctionKind, KdfSalt, RsaParams};
use blockscript::block::utility::{FileOp, ListOp, UtilityBlock, UtilityOp, VarOp};
use blockscript::block::{AesParams, Block, OutputBinding};
use blockscript::keyword::{CipherMode, Comparer, Encoding, HashAlgorithm, Keyword, PaddingMode};
use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serialize in both layouts and check each re-parses to the same block.
fn assert_round_trip(block: &Block) {
    for indent in [false, true] {
        let text = block.serialize(indent);
        let parsed = Block::parse(&text).unwrap_or_else(|e| panic!("failed to re-parse {:?}: {}", text, e));
        assert_eq!(&parsed, block, "round trip through {:?}", text);
    }
}

fn function(function: Function) -> FunctionBlock {
    FunctionBlock::new(function)
}

fn every_function() -> Vec<Function> {
    let mut dictionary = IndexMap::new();
    dictionary.insert("ab".to_string(), "X".to_string());
    dictionary.insert("a \"quoted\"".to_string(), "C:\\dir".to_string());

    vec![
        Function::Hash { algorithm: HashAlgorithm::Md5 },
        Function::Hmac {
            algorithm: HashAlgorithm::Sha384,
            key: "<KEY>".into(),
            base64: true,
        },
        Function::Translate {
            stop_after_first_match: false,
            dictionary,
        },
        Function::DateToUnixTime { format: "yyyy-MM-dd".into() },
        Function::Replace {
            what: "\\d+".into(),
            with: "".into(),
            use_regex: true,
        },
        Function::RegexMatch { pattern: "id=\"(\\w+)\"".into() },
        Function::RandomNum { min: -5, max: 10 },
        Function::CountOccurrences { needle: "a".into() },
        Function::RsaEncrypt(RsaParams {
            key: "k".into(),
            modulus: "m".into(),
            exponent: "AQAB".into(),
            oaep: false,
        }),
        Function::RsaDecrypt(RsaParams::default()),
        Function::CharAt { index: "<I>".into() },
        Function::Substring {
            index: "1".into(),
            length: "<LEN>".into(),
        },
        Function::AesEncrypt(AesParams {
            key: "a2V5".into(),
            iv: "aXY=".into(),
            mode: CipherMode::Ecb,
            padding: PaddingMode::Pkcs7,
        }),
        Function::AesDecrypt(AesParams::default()),
        Function::Pbkdf2Pkcs5 {
            salt: KdfSalt::Fixed("".into()),
            iterations: 1000,
            key_size: 32,
            algorithm: HashAlgorithm::Sha256,
        },
        Function::Pbkdf2Pkcs5 {
            salt: KdfSalt::Random(12),
            iterations: 1,
            key_size: 16,
            algorithm: HashAlgorithm::Sha1,
        },
    ]
}

// ---------------------------------------------------------------------------
// Function blocks
// ---------------------------------------------------------------------------

#[test]
fn every_function_kind_at_defaults() {
    for kind in FunctionKind::ALL {
        let block = Block::from(function(Function::new(*kind)));
        assert_round_trip(&block);
    }
}

#[test]
fn every_function_kind_with_input_and_output() {
    for kind in FunctionKind::ALL {
        let block = Block::from(
            function(Function::new(*kind))
                .with_input("<INPUT> \"q\"")
                .with_output(OutputBinding::cap("OUT")),
        )
        .with_label("step one");
        assert_round_trip(&block);
    }
}

#[test]
fn non_default_arguments() {
    for f in every_function() {
        assert_round_trip(&Block::from(function(f.clone())));
        assert_round_trip(
            &Block::from(function(f).with_input("x").with_output(OutputBinding::var("y"))).disabled(true),
        );
    }
}

#[test]
fn default_flags_are_elided() {
    let block = Block::from(function(Function::new(FunctionKind::Replace)).with_input("abc"));
    assert_eq!(block.serialize(false), r#"FUNCTION Replace "" "" "abc""#);

    let block = Block::from(function(Function::new(FunctionKind::RsaEncrypt)));
    assert_eq!(block.serialize(false), r#"FUNCTION RSAEncrypt "" "" """#);
}

#[test]
fn translate_layouts() {
    let text = "FUNCTION Translate\n  KEY \"a\" VALUE \"1\"\n  KEY \"b\" VALUE \"2\"\n  \"ab\" -> VAR \"T\"";
    let block = Block::parse(text).unwrap();
    assert_eq!(block.serialize(true), text);
    assert_eq!(
        block.serialize(false),
        r#"FUNCTION Translate KEY "a" VALUE "1" KEY "b" VALUE "2" "ab" -> VAR "T""#
    );
}

#[test]
fn hash_defaults_to_sha512_only_when_constructed() {
    assert_eq!(
        Function::new(FunctionKind::Hash),
        Function::Hash { algorithm: HashAlgorithm::Sha512 }
    );
    // The algorithm is positional, so it is always written.
    let block = Block::from(function(Function::new(FunctionKind::Hash)));
    assert_eq!(block.serialize(false), "FUNCTION Hash SHA512");
}

// ---------------------------------------------------------------------------
// Utility blocks
// ---------------------------------------------------------------------------

#[test]
fn every_list_action() {
    let actions = vec![
        ListOp::Create,
        ListOp::Length,
        ListOp::Join { separator: ", ".into() },
        ListOp::Sort { ascending: true, numeric: false },
        ListOp::Sort { ascending: false, numeric: true },
        ListOp::Concat { second: "B".into() },
        ListOp::Zip { second: "B".into() },
        ListOp::Map { second: "B".into() },
        ListOp::Add { item: "<X>".into(), index: "-1".into() },
        ListOp::Remove { index: "0".into() },
        ListOp::RemoveValues { comparer: Comparer::MatchesRegex, term: "^\\d+$".into() },
        ListOp::RemoveDuplicates,
        ListOp::Random,
        ListOp::Shuffle,
    ];
    for action in actions {
        assert_round_trip(&Block::from(UtilityBlock::list("L", action.clone())));
        assert_round_trip(&Block::from(
            UtilityBlock::list("L", action).with_output(OutputBinding::var("R")),
        ));
    }
}

#[test]
fn variable_conversion_and_file_ops() {
    let ops = vec![
        UtilityOp::Variable {
            variable: "CSV".into(),
            action: VarOp::Split { separator: ";".into() },
        },
        UtilityOp::Conversion {
            from: Encoding::Hex,
            to: Encoding::Unicode,
            input: "<HEX>".into(),
        },
        UtilityOp::File { path: "out/a.txt".into(), action: FileOp::Read },
        UtilityOp::File { path: "a.txt".into(), action: FileOp::ReadLines },
        UtilityOp::File { path: "a.txt".into(), action: FileOp::Write { input: "x\\ny".into() } },
        UtilityOp::File { path: "a.txt".into(), action: FileOp::WriteLines { input: "<L[*]>".into() } },
        UtilityOp::File { path: "a.txt".into(), action: FileOp::Append { input: "".into() } },
        UtilityOp::File { path: "a.txt".into(), action: FileOp::AppendLines { input: "z".into() } },
    ];
    for op in ops {
        assert_round_trip(&Block::from(UtilityBlock::new(op)).with_label("util step"));
    }
}

#[test]
fn sort_flags_are_elided_at_defaults() {
    let block = Block::from(UtilityBlock::list("L", ListOp::Sort { ascending: true, numeric: false }));
    assert_eq!(block.serialize(false), r#"UTILITY List "L" Sort"#);

    let block = Block::from(UtilityBlock::list("L", ListOp::Sort { ascending: false, numeric: true }));
    assert_eq!(block.serialize(false), r#"UTILITY List "L" Sort Ascending=False Numeric=True"#);
}

// ---------------------------------------------------------------------------
// Whole scripts
// ---------------------------------------------------------------------------

#[test]
fn script_round_trip_is_stable() {
    let source = r#"## fetch and transform
#start FUNCTION Constant "a,b,c" -> VAR "CSV"
UTILITY Variable "CSV" Split "," -> VAR "PARTS"
function hash sha256 "<PARTS[*]>" -> cap "HASHES"
!UTILITY File "out.txt" AppendLines "<HASHES[*]>"
"#;
    let config = Parser::new(source.to_string(), 0).parse().unwrap();
    assert_eq!(config.statements.len(), 4);

    let canonical = config.to_script(true);
    assert!(canonical.contains(r#"FUNCTION Hash SHA256 "<PARTS[*]>" -> CAP "HASHES""#));

    let reparsed = Parser::new(canonical.clone(), 0).parse().unwrap();
    assert_eq!(reparsed.to_script(true), canonical);
}

#[test]
fn label_starting_with_hash_survives() {
    let block = Block::from(function(Function::Constant).with_input("a")).with_label("#step");
    assert_round_trip(&block);

    let config = blockscript::Config::from_blocks([block.clone()]);
    let reparsed = Parser::new(config.to_script(false), 0).parse().unwrap();
    assert_eq!(reparsed.blocks().collect::<Vec<_>>(), vec![&block]);
}

#[test]
fn literal_with_line_breaks_survives() {
    let block = Block::from(
        function(Function::Replace {
            what: "\r\n".into(),
            with: "\\n".into(),
            use_regex: false,
        })
        .with_input("line1\nline2"),
    );
    assert_round_trip(&block);

    let config = blockscript::Config::from_blocks([block.clone(), Block::from(function(Function::Trim))]);
    let reparsed = Parser::new(config.to_script(true), 0).parse().unwrap();
    assert_eq!(reparsed.statements.len(), 2);
    assert_eq!(reparsed.statements[0].block, block);
}

#[test]
fn comments_are_written_back() {
    let source = "## keep me\nFUNCTION Constant \"a\"\n## between\n!UTILITY List \"L\" Create\n## last\n";
    let config = Parser::new(source.to_string(), 0).parse().unwrap();
    assert_eq!(config.to_script(false), source);
}
