//! A hierarchical key/value store for run-time parameters. Input looks like
//!
//! ```text
//! # comments run to the end of the line
//! amr.max_level      = 2
//! amr.ref_ratio      = 2 4
//! geometry.prob_lo   = 0.0 0.0
//! title              = "a quoted string"
//! stencil            = (1, (2, 3))
//! species { name = electron  mass = 1.0 }
//! FILE               = more_inputs
//! ```
//!
//! A name may be defined more than once; queries see the last definition, so
//! later input (e.g. command-line overrides appended after a file) wins.
//!

use std::collections::BTreeSet;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use std::sync::{Arc, Mutex};
use crate::error::Error;




/**
 * A parameter table entry: a named list of values, or a named sub-table.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Leaf(Vec<String>),
    Table(Vec<Entry>),
}




/**
 * A parsed parameter table, in input order.
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    entries: Vec<Entry>,
}




// ============================================================================
impl Table {

    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Parse a table from a string. `FILE = path` directives are resolved
     * relative to the current directory.
     */
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut lexer = Lexer::new(input);
        Ok(Self { entries: build(&mut lexer, false, None)? })
    }

    /**
     * Parse a table from a file. `FILE = path` directives inside it are
     * resolved relative to the file's directory.
     */
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| Error::Io(path.display().to_string(), e))?;
        let mut lexer = Lexer::new(&input);
        Ok(Self { entries: build(&mut lexer, false, path.parent())? })
    }

    /**
     * Parse command-line style definitions, e.g. `["amr.max_level=2",
     * "amr.grid_eff=0.8"]`. The arguments are joined with spaces and parsed as
     * a single input.
     */
    pub fn from_args<I, S>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse(&joined.join(" "))
    }

    /**
     * Append the entries of another table; they take precedence over
     * existing definitions of the same name.
     */
    pub fn append(&mut self, other: Table) {
        self.entries.extend(other.entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}




/**
 * Values which can be parsed from a parameter string.
 */
pub trait FromParm: Sized {
    const TYPE_NAME: &'static str;
    fn from_parm(s: &str) -> Option<Self>;
}

impl FromParm for i64 {
    const TYPE_NAME: &'static str = "integer";
    fn from_parm(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromParm for i32 {
    const TYPE_NAME: &'static str = "integer";
    fn from_parm(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromParm for usize {
    const TYPE_NAME: &'static str = "non-negative integer";
    fn from_parm(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromParm for f64 {
    const TYPE_NAME: &'static str = "real number";
    fn from_parm(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromParm for String {
    const TYPE_NAME: &'static str = "string";
    fn from_parm(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

impl FromParm for bool {
    const TYPE_NAME: &'static str = "boolean";
    fn from_parm(s: &str) -> Option<Self> {
        match s {
            "true" | "t" => Some(true),
            "false" | "f" => Some(false),
            _ => s.parse::<i64>().map(|i| i != 0).ok().or_else(|| s.parse::<f64>().map(|x| x != 0.0).ok()),
        }
    }
}




/**
 * A view of a parameter table under a name prefix: with prefix `amr`, a query
 * for `max_level` looks up `amr.max_level`. Views made with `with_prefix`
 * share the table and the record of which names have been queried.
 */
#[derive(Clone, Debug)]
pub struct ParmParse {
    table: Arc<Table>,
    prefix: String,
    queried: Arc<Mutex<BTreeSet<String>>>,
}




// ============================================================================
impl ParmParse {

    pub fn new(table: Table) -> Self {
        Self {
            table: Arc::new(table),
            prefix: String::new(),
            queried: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self { prefix: prefix.to_string(), ..self.clone() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn prefixed_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    pub fn get<T: FromParm>(&self, name: &str) -> Result<T, Error> {
        self.get_val(name, 0)
    }

    pub fn query<T: FromParm>(&self, name: &str) -> Result<Option<T>, Error> {
        self.query_val(name, 0)
    }

    pub fn get_val<T: FromParm>(&self, name: &str, ival: usize) -> Result<T, Error> {
        self.query_val(name, ival)?.ok_or_else(|| Error::MissingParameter(self.prefixed_name(name)))
    }

    /**
     * Return value number `ival` of the last definition of `name`, or `None`
     * if the name is not defined. A definition without that many values, or a
     * value which doesn't parse as `T`, is an error.
     */
    pub fn query_val<T: FromParm>(&self, name: &str, ival: usize) -> Result<Option<T>, Error> {
        self.value_at(name, None, ival)
    }

    pub fn get_kth<T: FromParm>(&self, name: &str, k: usize, ival: usize) -> Result<T, Error> {
        self.query_kth(name, k, ival)?.ok_or_else(|| Error::MissingParameter(self.prefixed_name(name)))
    }

    /**
     * Return value number `ival` of definition number `k` of `name`, counting
     * definitions from the top of the input. `None` if there are not `k + 1`
     * definitions.
     */
    pub fn query_kth<T: FromParm>(&self, name: &str, k: usize, ival: usize) -> Result<Option<T>, Error> {
        self.value_at(name, Some(k), ival)
    }

    pub fn get_arr<T: FromParm>(&self, name: &str) -> Result<Vec<T>, Error> {
        self.query_arr(name)?.ok_or_else(|| Error::MissingParameter(self.prefixed_name(name)))
    }

    /**
     * Return every value of the last definition of `name`.
     */
    pub fn query_arr<T: FromParm>(&self, name: &str) -> Result<Option<Vec<T>>, Error> {
        self.values_of(name, None)
    }

    pub fn get_kth_arr<T: FromParm>(&self, name: &str, k: usize) -> Result<Vec<T>, Error> {
        self.query_kth_arr(name, k)?.ok_or_else(|| Error::MissingParameter(self.prefixed_name(name)))
    }

    /**
     * Return every value of definition number `k` of `name`.
     */
    pub fn query_kth_arr<T: FromParm>(&self, name: &str, k: usize) -> Result<Option<Vec<T>>, Error> {
        self.values_of(name, Some(k))
    }

    /**
     * Return the number of values in the last definition of `name`, or zero.
     */
    pub fn count_val(&self, name: &str) -> usize {
        self.find_leaf(&self.prefixed_name(name), None).map_or(0, |v| v.len())
    }

    /**
     * Return the number of values in definition number `k` of `name`, or
     * zero if there is no such definition.
     */
    pub fn count_val_kth(&self, name: &str, k: usize) -> usize {
        self.find_leaf(&self.prefixed_name(name), Some(k)).map_or(0, |v| v.len())
    }

    /**
     * Return the number of times `name` is defined.
     */
    pub fn count_name(&self, name: &str) -> usize {
        let full = self.prefixed_name(name);
        self.table.entries.iter().filter(|e| e.name == full && matches!(e.value, Value::Leaf(_))).count()
    }

    pub fn contains(&self, name: &str) -> bool {
        let full = self.prefixed_name(name);
        self.table.entries.iter().any(|e| e.name == full)
    }

    /**
     * Return a view of the last record (sub-table) called `name`. The view
     * has its own record of queried names.
     */
    pub fn record(&self, name: &str) -> Result<ParmParse, Error> {
        let full = self.prefixed_name(name);
        self.mark(&full);

        self.table.entries
            .iter()
            .rev()
            .find_map(|e| match &e.value {
                Value::Table(entries) if e.name == full => Some(ParmParse::new(Table { entries: entries.clone() })),
                _ => None,
            })
            .ok_or(Error::MissingParameter(full))
    }

    /**
     * Return the names of definitions that have never been queried, in input
     * order. Useful for catching misspelled parameters.
     */
    pub fn unused_entries(&self) -> Vec<String> {
        let queried = match self.queried.lock() {
            Ok(q) => q.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let mut seen = BTreeSet::new();

        self.table.entries
            .iter()
            .filter(|e| !queried.contains(&e.name) && seen.insert(e.name.clone()))
            .map(|e| e.name.clone())
            .collect()
    }

    fn value_at<T: FromParm>(&self, name: &str, occurrence: Option<usize>, ival: usize) -> Result<Option<T>, Error> {
        let full = self.prefixed_name(name);

        match self.find_leaf(&full, occurrence) {
            None => Ok(None),
            Some(values) => {
                let value = values.get(ival).ok_or(Error::MissingValue { name: full.clone(), index: ival })?;
                parse_value(&full, value).map(Some)
            }
        }
    }

    fn values_of<T: FromParm>(&self, name: &str, occurrence: Option<usize>) -> Result<Option<Vec<T>>, Error> {
        let full = self.prefixed_name(name);

        match self.find_leaf(&full, occurrence) {
            None => Ok(None),
            Some(values) => values.iter().map(|v| parse_value(&full, v)).collect::<Result<Vec<_>, _>>().map(Some),
        }
    }

    /**
     * Find definition number `occurrence` of `full` counting from the top, or
     * the last one if `occurrence` is `None`. Finding any definition marks
     * the name as queried.
     */
    fn find_leaf(&self, full: &str, occurrence: Option<usize>) -> Option<&Vec<String>> {
        let mut leaves = self.table.entries.iter().filter_map(|e| match &e.value {
            Value::Leaf(values) if e.name == full => Some(values),
            _ => None,
        });
        let found = match occurrence {
            None => leaves.last(),
            Some(k) => leaves.nth(k),
        };
        if found.is_some() {
            self.mark(full)
        }
        found
    }

    fn mark(&self, full: &str) {
        if let Ok(mut queried) = self.queried.lock() {
            queried.insert(full.to_string());
        }
    }
}

fn parse_value<T: FromParm>(name: &str, value: &str) -> Result<T, Error> {
    T::from_parm(value).ok_or_else(|| Error::TypeMismatch {
        name: name.to_string(),
        value: value.to_string(),
        expected: T::TYPE_NAME,
    })
}




// ============================================================================
#[derive(Debug, PartialEq)]
enum Token {
    Defn(String),
    Value(String),
    EqSign,
    OpenBracket,
    CloseBracket,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {

    fn new(input: &'a str) -> Self {
        Self { chars: input.chars().peekable() }
    }

    fn eat_garbage(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                while let Some(c) = self.chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        self.eat_garbage();

        let c = match self.chars.next() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };

        match c {
            '=' => Ok(Token::EqSign),
            '{' => Ok(Token::OpenBracket),
            '}' => Ok(Token::CloseBracket),
            '"' => self.quoted_string(),
            '(' => self.list(),
            c if c.is_alphabetic() => Ok(self.identifier(c)),
            c => Ok(Token::Value(self.string(c.to_string()))),
        }
    }

    fn identifier(&mut self, first: char) -> Token {
        let mut s = first.to_string();

        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || "_.[]+-".contains(c) {
                s.push(c);
                self.chars.next();
            } else if c.is_whitespace() || c == '=' {
                return Token::Defn(s);
            } else {
                return Token::Value(self.string(s));
            }
        }
        Token::Defn(s)
    }

    fn string(&mut self, mut s: String) -> String {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '=' {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s
    }

    fn quoted_string(&mut self) -> Result<Token, Error> {
        let mut s = String::new();

        for c in &mut self.chars {
            if c == '"' {
                return Ok(Token::Value(s));
            }
            s.push(c);
        }
        Err(Error::Syntax(format!("unterminated quoted string \"{}", s)))
    }

    fn list(&mut self) -> Result<Token, Error> {
        let mut s = String::from("(");
        let mut depth = 1;

        for c in &mut self.chars {
            s.push(c);

            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Token::Value(s));
                    }
                }
                _ => (),
            }
        }
        Err(Error::Syntax(format!("unbalanced parentheses in {}", s)))
    }
}




// ============================================================================
fn build(lexer: &mut Lexer, nested: bool, base_dir: Option<&Path>) -> Result<Vec<Entry>, Error> {
    let mut entries = Vec::new();
    let mut cur_name: Option<String> = None;
    let mut cur_list: Vec<String> = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::CloseBracket => {
                if !nested {
                    return Err(Error::Syntax("'}' without a matching '{'".into()));
                }
                add_defn(&mut entries, cur_name.take(), &mut cur_list, base_dir)?;
                return Ok(entries);
            }
            Token::Eof => {
                if nested {
                    return Err(Error::Syntax("end of input inside a record".into()));
                }
                add_defn(&mut entries, cur_name.take(), &mut cur_list, base_dir)?;
                return Ok(entries);
            }
            Token::OpenBracket => {
                let name = match cur_list.pop() {
                    Some(last) => {
                        add_defn(&mut entries, cur_name.take(), &mut cur_list, base_dir)?;
                        last
                    }
                    None => cur_name.take().ok_or_else(|| Error::Syntax("'{' without a record name".into()))?,
                };
                let table = build(lexer, true, base_dir)?;

                if table.is_empty() {
                    return Err(Error::Syntax(format!("record {} has no entries", name)));
                }
                entries.push(Entry { name, value: Value::Table(table) });
            }
            Token::EqSign => {
                if cur_name.is_none() {
                    return Err(Error::Syntax("'=' without a definition name".into()));
                }
                // The last value read belongs to the next definition.
                if let Some(last) = cur_list.pop() {
                    add_defn(&mut entries, cur_name.take(), &mut cur_list, base_dir)?;
                    cur_name = Some(last);
                }
            }
            Token::Defn(s) if cur_name.is_none() => cur_name = Some(s),
            Token::Defn(s) | Token::Value(s) => {
                if cur_name.is_none() {
                    return Err(Error::Syntax(format!("value {} without a definition name", s)));
                }
                cur_list.push(s)
            }
        }
    }
}

fn add_defn(entries: &mut Vec<Entry>, name: Option<String>, values: &mut Vec<String>, base_dir: Option<&Path>) -> Result<(), Error> {
    let name = match name {
        None => {
            values.clear();
            return Ok(());
        }
        Some(name) => name,
    };
    if values.is_empty() {
        return Err(Error::Syntax(format!("no values for definition {}", name)));
    }
    let values = std::mem::take(values);

    if name == "FILE" && values.len() == 1 {
        let path = match base_dir {
            Some(dir) => dir.join(&values[0]),
            None => Path::new(&values[0]).to_path_buf(),
        };
        entries.extend(Table::from_file(path)?.entries)
    } else {
        entries.push(Entry { name, value: Value::Leaf(values) })
    }
    Ok(())
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{ParmParse, Table, Value};
    use crate::error::Error;

    const INPUT: &str = r#"
        # the amr namespace
        amr.max_level = 2
        amr.ref_ratio = 2 4      # one per level transition
        amr.grid_eff  = 0.75
        amr.use_fixed_coarse_grids = t
        title = "two bubbles"
        stencil = (1, (2, 3)) extra
        species { name = electron mass = 1.0 }
        amr.max_level = 3
    "#;

    #[test]
    fn definitions_parse_and_last_one_wins() {
        let pp = ParmParse::new(Table::parse(INPUT).unwrap());
        let amr = pp.with_prefix("amr");

        assert_eq!(amr.get::<i64>("max_level").unwrap(), 3);
        assert_eq!(amr.count_name("max_level"), 2);
        assert_eq!(amr.get_arr::<i64>("ref_ratio").unwrap(), vec![2, 4]);
        assert_eq!(amr.get_val::<i64>("ref_ratio", 1).unwrap(), 4);
        assert_eq!(amr.get::<f64>("grid_eff").unwrap(), 0.75);
        assert!(amr.get::<bool>("use_fixed_coarse_grids").unwrap());
        assert_eq!(pp.get::<String>("title").unwrap(), "two bubbles");
        assert_eq!(pp.get_arr::<String>("stencil").unwrap(), vec!["(1, (2, 3))", "extra"]);
        assert_eq!(pp.count_val("stencil"), 2);
        assert_eq!(amr.query::<i64>("n_proper").unwrap(), None);
    }

    #[test]
    fn kth_queries_count_definitions_from_the_top() {
        let pp = ParmParse::new(Table::parse("a = 1\nb = 5\na = 2 3\na = 4").unwrap());

        assert_eq!(pp.get_kth::<i64>("a", 0, 0).unwrap(), 1);
        assert_eq!(pp.get_kth::<i64>("a", 1, 1).unwrap(), 3);
        assert_eq!(pp.get_kth::<i64>("a", 2, 0).unwrap(), 4);
        assert_eq!(pp.get::<i64>("a").unwrap(), 4);
        assert_eq!(pp.query_kth::<i64>("a", 3, 0).unwrap(), None);
        assert!(matches!(pp.get_kth::<i64>("a", 3, 0), Err(Error::MissingParameter(_))));
        assert!(matches!(pp.get_kth::<i64>("a", 0, 1), Err(Error::MissingValue { .. })));

        assert_eq!(pp.get_kth_arr::<i64>("a", 1).unwrap(), vec![2, 3]);
        assert_eq!(pp.query_kth_arr::<i64>("b", 1).unwrap(), None);
        assert_eq!(pp.count_val_kth("a", 0), 1);
        assert_eq!(pp.count_val_kth("a", 1), 2);
        assert_eq!(pp.count_val_kth("a", 5), 0);
        assert_eq!(pp.count_val("a"), 1);
        assert_eq!(pp.unused_entries(), vec!["b".to_string()]);
    }

    #[test]
    fn records_nest_tables_by_value() {
        let table = Table::parse(INPUT).unwrap();
        let species = table.entries().iter().find(|e| e.name == "species").unwrap();
        assert!(matches!(species.value, Value::Table(ref t) if t.len() == 2));

        let pp = ParmParse::new(table);
        let species = pp.record("species").unwrap();
        assert_eq!(species.get::<String>("name").unwrap(), "electron");
        assert_eq!(species.get::<f64>("mass").unwrap(), 1.0);
        assert!(pp.record("nonexistent").is_err());
    }

    #[test]
    fn type_errors_are_reported() {
        let pp = ParmParse::new(Table::parse("amr.max_level = two").unwrap());
        assert!(matches!(pp.get::<i64>("amr.max_level"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(pp.get_val::<String>("amr.max_level", 1), Err(Error::MissingValue { .. })));
        assert!(matches!(pp.get::<i64>("amr.n_cell"), Err(Error::MissingParameter(_))));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(Table::parse("= 3").is_err());
        assert!(Table::parse("a = ").is_err());
        assert!(Table::parse("a = \"open").is_err());
        assert!(Table::parse("a = (1 2").is_err());
        assert!(Table::parse("rec { a = 1").is_err());
        assert!(Table::parse("a = 1 }").is_err());
    }

    #[test]
    fn command_line_overrides_are_appended() {
        let mut table = Table::parse("amr.max_level = 1\namr.n_proper = 1").unwrap();
        table.append(Table::from_args(vec!["amr.max_level=4", "amr.grid_eff=0.9"]).unwrap());
        let pp = ParmParse::new(table).with_prefix("amr");
        assert_eq!(pp.get::<i64>("max_level").unwrap(), 4);
        assert_eq!(pp.get::<f64>("grid_eff").unwrap(), 0.9);
    }

    #[test]
    fn unused_entries_are_listed() {
        let pp = ParmParse::new(Table::parse("a = 1\nb = 2\nc = 3\na = 4").unwrap());
        pp.get::<i64>("a").unwrap();
        assert_eq!(pp.unused_entries(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn booleans_accept_words_and_numbers() {
        let pp = ParmParse::new(Table::parse("a = false b = 1 c = 0.0 d = yes").unwrap());
        assert!(!pp.get::<bool>("a").unwrap());
        assert!(pp.get::<bool>("b").unwrap());
        assert!(!pp.get::<bool>("c").unwrap());
        assert!(pp.get::<bool>("d").is_err());
    }

    #[test]
    fn file_directive_includes_another_file() {
        let dir = std::env::temp_dir().join(format!("amrgrid-parmparse-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("inner"), "amr.n_proper = 2\n").unwrap();
        std::fs::write(dir.join("outer"), "amr.max_level = 1\nFILE = inner\n").unwrap();

        let pp = ParmParse::new(Table::from_file(dir.join("outer")).unwrap()).with_prefix("amr");
        assert_eq!(pp.get::<i64>("n_proper").unwrap(), 2);
        assert_eq!(pp.get::<i64>("max_level").unwrap(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
