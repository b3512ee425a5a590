use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Canonical string form of every timestamp written to the store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Property every node is resolved by when relationships are created
pub const ID_PROPERTY: &str = "id";

/// A single typed cell. `Empty` marks an absent or unparseable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Str(String),
    Int(i64),
    Timestamp(NaiveDateTime),
    Empty,
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Narrows the value to an integer identifier.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Empty => Ok(()),
        }
    }
}

/// One source row, aligned to the columns of its [`RecordSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
    /// Line the row starts on in its source file
    pub line: Option<u64>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, line: None }
    }

    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }
}

/// Records sharing one canonical column list.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterates `(column, value)` pairs of one record.
    pub fn fields<'a>(
        &'a self,
        record: &'a Record,
    ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(record.values.iter())
    }
}

/// Node labels the loader is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    Person,
    Tag,
    Comment,
    Forum,
    Post,
    University,
    Company,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Person => "Person",
            Label::Tag => "Tag",
            Label::Comment => "Comment",
            Label::Forum => "Forum",
            Label::Post => "Post",
            Label::University => "University",
            Label::Company => "Company",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types the loader is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelType {
    Knows,
    Interest,
    LikesComment,
    Member,
    Moderator,
    HasTag,
    LikesPost,
    Tagged,
    WorkAt,
    StudyAt,
    HasCreatorComment,
    HasCreatorPost,
}

impl RelType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelType::Knows => "KNOWS",
            RelType::Interest => "INTEREST",
            RelType::LikesComment => "LIKES_COMMENT",
            RelType::Member => "MEMBER",
            RelType::Moderator => "MODERATOR",
            RelType::HasTag => "HAS_TAG",
            RelType::LikesPost => "LIKES_POST",
            RelType::Tagged => "TAGGED",
            RelType::WorkAt => "WORK_AT",
            RelType::StudyAt => "STUDY_AT",
            RelType::HasCreatorComment => "HAS_CREATOR_COMMENT",
            RelType::HasCreatorPost => "HAS_CREATOR_POST",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
