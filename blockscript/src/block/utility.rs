use crate::block::{BlockBody, OutputBinding, parse_output};
use crate::keyword::{Comparer, Encoding, Keyword, keywords};
use crate::parser::error::ParseError;
use crate::parser::token::TokenStream;
use crate::writer::BlockWriter;

keywords! {
    pub enum UtilityGroup {
        List => "List",
        Variable => "Variable",
        Conversion => "Conversion",
        File => "File",
    }
}

keywords! {
    pub enum ListAction {
        Create => "Create",
        Length => "Length",
        Join => "Join",
        Sort => "Sort",
        Concat => "Concat",
        Zip => "Zip",
        Map => "Map",
        Add => "Add",
        Remove => "Remove",
        RemoveValues => "RemoveValues",
        RemoveDuplicates => "RemoveDuplicates",
        Random => "Random",
        Shuffle => "Shuffle",
    }
}

keywords! {
    pub enum VarAction {
        Split => "Split",
    }
}

keywords! {
    pub enum FileAction {
        Read => "Read",
        ReadLines => "ReadLines",
        Write => "Write",
        WriteLines => "WriteLines",
        Append => "Append",
        AppendLines => "AppendLines",
    }
}

pub const DEFAULT_SORT_ASCENDING: bool = true;
pub const DEFAULT_SORT_NUMERIC: bool = false;
/// Index that means "at the end" for Add and Remove.
pub const DEFAULT_LIST_INDEX: &str = "-1";
pub const DEFAULT_SEPARATOR: &str = ",";

/// What to do with a list, plus the arguments of that action.
///
/// Every string argument is a template substituted at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    Create,
    Length,
    Join { separator: String },
    Sort { ascending: bool, numeric: bool },
    Concat { second: String },
    Zip { second: String },
    /// First list supplies the keys, second the values.
    Map { second: String },
    Add { item: String, index: String },
    Remove { index: String },
    /// Drops every element that satisfies `comparer` against `term`.
    RemoveValues { comparer: Comparer, term: String },
    RemoveDuplicates,
    Random,
    Shuffle,
}

impl ListOp {
    /// The op for `action` with every argument at its default.
    pub fn new(action: ListAction) -> Self {
        match action {
            ListAction::Create => ListOp::Create,
            ListAction::Length => ListOp::Length,
            ListAction::Join => ListOp::Join { separator: DEFAULT_SEPARATOR.to_string() },
            ListAction::Sort => ListOp::Sort {
                ascending: DEFAULT_SORT_ASCENDING,
                numeric: DEFAULT_SORT_NUMERIC,
            },
            ListAction::Concat => ListOp::Concat { second: String::new() },
            ListAction::Zip => ListOp::Zip { second: String::new() },
            ListAction::Map => ListOp::Map { second: String::new() },
            ListAction::Add => ListOp::Add {
                item: String::new(),
                index: DEFAULT_LIST_INDEX.to_string(),
            },
            ListAction::Remove => ListOp::Remove { index: DEFAULT_LIST_INDEX.to_string() },
            ListAction::RemoveValues => ListOp::RemoveValues {
                comparer: Comparer::EqualTo,
                term: String::new(),
            },
            ListAction::RemoveDuplicates => ListOp::RemoveDuplicates,
            ListAction::Random => ListOp::Random,
            ListAction::Shuffle => ListOp::Shuffle,
        }
    }

    pub fn action(&self) -> ListAction {
        match self {
            ListOp::Create => ListAction::Create,
            ListOp::Length => ListAction::Length,
            ListOp::Join { .. } => ListAction::Join,
            ListOp::Sort { .. } => ListAction::Sort,
            ListOp::Concat { .. } => ListAction::Concat,
            ListOp::Zip { .. } => ListAction::Zip,
            ListOp::Map { .. } => ListAction::Map,
            ListOp::Add { .. } => ListAction::Add,
            ListOp::Remove { .. } => ListAction::Remove,
            ListOp::RemoveValues { .. } => ListAction::RemoveValues,
            ListOp::RemoveDuplicates => ListAction::RemoveDuplicates,
            ListOp::Random => ListAction::Random,
            ListOp::Shuffle => ListAction::Shuffle,
        }
    }

    fn parse(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let action: ListAction = tokens.expect_enum("List Action")?;
        let op = match action {
            ListAction::Join => ListOp::Join {
                separator: tokens.expect_literal("Separator")?,
            },
            ListAction::Sort => {
                let mut ascending = DEFAULT_SORT_ASCENDING;
                let mut numeric = DEFAULT_SORT_NUMERIC;
                tokens.read_flags(&mut [("Ascending", &mut ascending), ("Numeric", &mut numeric)])?;
                ListOp::Sort { ascending, numeric }
            }
            ListAction::Concat => ListOp::Concat {
                second: tokens.expect_literal("Second List Name")?,
            },
            ListAction::Zip => ListOp::Zip {
                second: tokens.expect_literal("Second List Name")?,
            },
            ListAction::Map => ListOp::Map {
                second: tokens.expect_literal("Second List Name")?,
            },
            ListAction::Add => ListOp::Add {
                item: tokens.expect_literal("Item")?,
                index: tokens.expect_literal("Index")?,
            },
            ListAction::Remove => ListOp::Remove {
                index: tokens.expect_literal("Index")?,
            },
            ListAction::RemoveValues => ListOp::RemoveValues {
                comparer: tokens.expect_enum("Comparer")?,
                term: tokens.expect_literal("Comparison Term")?,
            },
            // The rest take no arguments.
            other => ListOp::new(other),
        };
        Ok(op)
    }

    fn write(&self, w: &mut BlockWriter) {
        w.token(self.action());
        match self {
            ListOp::Join { separator } => {
                w.literal(separator);
            }
            ListOp::Sort { ascending, numeric } => {
                w.flag("Ascending", *ascending, DEFAULT_SORT_ASCENDING)
                    .flag("Numeric", *numeric, DEFAULT_SORT_NUMERIC);
            }
            ListOp::Concat { second } | ListOp::Zip { second } | ListOp::Map { second } => {
                w.literal(second);
            }
            ListOp::Add { item, index } => {
                w.literal(item).literal(index);
            }
            ListOp::Remove { index } => {
                w.literal(index);
            }
            ListOp::RemoveValues { comparer, term } => {
                w.token(comparer).literal(term);
            }
            ListOp::Create | ListOp::Length | ListOp::RemoveDuplicates | ListOp::Random | ListOp::Shuffle => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarOp {
    /// Turn a Single cell into a List by splitting on `separator`.
    Split { separator: String },
}

impl VarOp {
    pub fn new(action: VarAction) -> Self {
        match action {
            VarAction::Split => VarOp::Split { separator: DEFAULT_SEPARATOR.to_string() },
        }
    }

    pub fn action(&self) -> VarAction {
        match self {
            VarOp::Split { .. } => VarAction::Split,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Read,
    ReadLines,
    Write { input: String },
    WriteLines { input: String },
    Append { input: String },
    AppendLines { input: String },
}

impl FileOp {
    pub fn action(&self) -> FileAction {
        match self {
            FileOp::Read => FileAction::Read,
            FileOp::ReadLines => FileAction::ReadLines,
            FileOp::Write { .. } => FileAction::Write,
            FileOp::WriteLines { .. } => FileAction::WriteLines,
            FileOp::Append { .. } => FileAction::Append,
            FileOp::AppendLines { .. } => FileAction::AppendLines,
        }
    }

    /// The text template to write, for the writing actions.
    pub fn input(&self) -> Option<&str> {
        match self {
            FileOp::Read | FileOp::ReadLines => None,
            FileOp::Write { input }
            | FileOp::WriteLines { input }
            | FileOp::Append { input }
            | FileOp::AppendLines { input } => Some(input),
        }
    }
}

/// The operation group and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtilityOp {
    List { list: String, action: ListOp },
    Variable { variable: String, action: VarOp },
    Conversion { from: Encoding, to: Encoding, input: String },
    File { path: String, action: FileOp },
}

impl UtilityOp {
    pub fn group(&self) -> UtilityGroup {
        match self {
            UtilityOp::List { .. } => UtilityGroup::List,
            UtilityOp::Variable { .. } => UtilityGroup::Variable,
            UtilityOp::Conversion { .. } => UtilityGroup::Conversion,
            UtilityOp::File { .. } => UtilityGroup::File,
        }
    }
}

/// `UTILITY <Group> [group arguments] [-> VAR|CAP "name"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityBlock {
    pub op: UtilityOp,
    pub output: Option<OutputBinding>,
}

impl UtilityBlock {
    pub fn new(op: UtilityOp) -> Self {
        UtilityBlock { op, output: None }
    }

    pub fn list(list: impl Into<String>, action: ListOp) -> Self {
        UtilityBlock::new(UtilityOp::List { list: list.into(), action })
    }

    pub fn with_output(mut self, output: OutputBinding) -> Self {
        self.output = Some(output);
        self
    }
}

impl BlockBody for UtilityBlock {
    const KEYWORD: &'static str = "UTILITY";

    fn parse_body(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let group: UtilityGroup = tokens.expect_enum("Group")?;
        let op = match group {
            UtilityGroup::List => {
                let list = tokens.expect_literal("List Name")?;
                let action = ListOp::parse(tokens)?;
                UtilityOp::List { list, action }
            }
            UtilityGroup::Variable => {
                let variable = tokens.expect_literal("Var Name")?;
                let action = match tokens.expect_enum::<VarAction>("Var Action")? {
                    VarAction::Split => VarOp::Split {
                        separator: tokens.expect_literal("Split Separator")?,
                    },
                };
                UtilityOp::Variable { variable, action }
            }
            UtilityGroup::Conversion => UtilityOp::Conversion {
                from: tokens.expect_enum("Conversion From")?,
                to: tokens.expect_enum("Conversion To")?,
                input: tokens.expect_literal("Input")?,
            },
            UtilityGroup::File => {
                let path = tokens.expect_literal("File Name")?;
                let action = match tokens.expect_enum::<FileAction>("File Action")? {
                    FileAction::Read => FileOp::Read,
                    FileAction::ReadLines => FileOp::ReadLines,
                    FileAction::Write => FileOp::Write { input: tokens.expect_literal("Input String")? },
                    FileAction::WriteLines => FileOp::WriteLines { input: tokens.expect_literal("Input String")? },
                    FileAction::Append => FileOp::Append { input: tokens.expect_literal("Input String")? },
                    FileAction::AppendLines => FileOp::AppendLines { input: tokens.expect_literal("Input String")? },
                };
                UtilityOp::File { path, action }
            }
        };
        let output = parse_output(tokens)?;
        Ok(UtilityBlock { op, output })
    }

    fn write_body(&self, w: &mut BlockWriter) {
        w.token(self.op.group().name());
        match &self.op {
            UtilityOp::List { list, action } => {
                w.literal(list);
                action.write(w);
            }
            UtilityOp::Variable { variable, action } => {
                w.literal(variable).token(action.action());
                match action {
                    VarOp::Split { separator } => w.literal(separator),
                };
            }
            UtilityOp::Conversion { from, to, input } => {
                w.token(from).token(to).literal(input);
            }
            UtilityOp::File { path, action } => {
                w.literal(path).token(action.action());
                if let Some(input) = action.input() {
                    w.literal(input);
                }
            }
        }
        w.output(self.output.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};

    fn parse_utility(text: &str) -> UtilityBlock {
        match Block::parse(text).expect("parse failed").kind {
            BlockKind::Utility(u) => u,
            other => panic!("expected utility block, got {:?}", other),
        }
    }

    #[test]
    fn sort_flags_default() {
        let u = parse_utility(r#"UTILITY List "L" Sort"#);
        assert_eq!(
            u.op,
            UtilityOp::List {
                list: "L".into(),
                action: ListOp::Sort { ascending: true, numeric: false },
            }
        );
    }

    #[test]
    fn sort_flags_in_any_order() {
        let u = parse_utility(r#"UTILITY List "L" Sort Numeric=True Ascending=False"#);
        let UtilityOp::List { action, .. } = u.op else {
            panic!("expected list op");
        };
        assert_eq!(action, ListOp::Sort { ascending: false, numeric: true });
    }

    #[test]
    fn sort_rejects_foreign_flag() {
        let err = Block::parse(r#"UTILITY List "L" Sort UseRegex=True"#).unwrap_err();
        assert!(err.message.contains("UseRegex"));
    }

    #[test]
    fn remove_values_takes_comparer_and_term() {
        let u = parse_utility(r#"UTILITY List "L" RemoveValues Contains "x" -> VAR "out""#);
        assert_eq!(
            u.op,
            UtilityOp::List {
                list: "L".into(),
                action: ListOp::RemoveValues {
                    comparer: Comparer::Contains,
                    term: "x".into(),
                },
            }
        );
        assert_eq!(u.output, Some(OutputBinding::var("out")));
    }

    #[test]
    fn file_write_requires_input() {
        let err = Block::parse(r#"UTILITY File "out.txt" Append"#).unwrap_err();
        assert_eq!(err.message, "expected Input String");

        let u = parse_utility(r#"UTILITY File "in.txt" ReadLines -> VAR "LINES""#);
        assert_eq!(u.op, UtilityOp::File { path: "in.txt".into(), action: FileOp::ReadLines });
    }

    #[test]
    fn conversion_requires_input_literal() {
        let err = Block::parse("UTILITY Conversion HEX BASE64").unwrap_err();
        assert_eq!(err.message, "expected Input");
    }

    #[test]
    fn unknown_group() {
        let err = Block::parse(r#"UTILITY Lists "L" Create"#).unwrap_err();
        assert!(err.message.contains("unknown Group"));
    }

    #[test]
    fn serializes_mandatory_literals_even_when_default_valued() {
        let block = Block::from(UtilityBlock::list(
            "L",
            ListOp::Add { item: "x".into(), index: DEFAULT_LIST_INDEX.into() },
        ));
        assert_eq!(block.serialize(true), r#"UTILITY List "L" Add "x" "-1""#);
    }

    #[test]
    fn every_action_has_a_default_with_the_same_action() {
        for action in ListAction::ALL {
            assert_eq!(ListOp::new(*action).action(), *action);
        }
        for action in VarAction::ALL {
            assert_eq!(VarOp::new(*action).action(), *action);
        }
        assert_eq!(
            ListOp::new(ListAction::Add),
            ListOp::Add { item: String::new(), index: "-1".into() }
        );
    }

    #[test]
    fn split_serializes_separator() {
        let block = Block::from(
            UtilityBlock::new(UtilityOp::Variable {
                variable: "CSV".into(),
                action: VarOp::Split { separator: DEFAULT_SEPARATOR.into() },
            })
            .with_output(OutputBinding::var("PARTS")),
        );
        assert_eq!(block.serialize(false), r#"UTILITY Variable "CSV" Split "," -> VAR "PARTS""#);
    }
}
