/// Configuration of an election: the questions voters have to answer
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    pub main_title: String,
    pub scaffold: Vec<Subject>,
}

impl Configuration {
    /// Maximum number of bytes taken by an encoded ballot answering this configuration
    ///
    /// Every record is counted with its line terminator; the last record has none.
    pub fn max_encoded_size(&self) -> usize {
        let size: usize = self.scaffold.iter().map(Subject::max_encoded_size).sum();
        size.saturating_sub(1)
    }
}

/// A group of questions, possibly nesting other subjects
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub title: String,

    /// Display order of the elements, by identifier. Purely presentational.
    #[serde(default)]
    pub order: Vec<String>,

    pub elements: Vec<Question>,
}

impl Subject {
    /// Sum of the encoded sizes of all questions in this subject, line terminators included
    pub fn max_encoded_size(&self) -> usize {
        self.elements.iter().map(Question::max_encoded_size).sum()
    }
}

/// A node of the question tree
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Question {
    Subject(Subject),
    Select(Select),
    Rank(Rank),
    Text(Text),
}

impl Question {
    pub fn id(&self) -> &str {
        match self {
            Question::Subject(q) => &q.id,
            Question::Select(q) => &q.id,
            Question::Rank(q) => &q.id,
            Question::Text(q) => &q.id,
        }
    }

    pub fn max_encoded_size(&self) -> usize {
        match self {
            Question::Subject(subject) => subject.max_encoded_size(),

            // at most 4 bytes ("-128") + ',' per choice
            Question::Rank(rank) => "rank::".len() + rank.id.len() + rank.choices.len() * 5,

            // 5 bytes ("false") + ',' per choice
            Question::Select(select) => {
                "select::".len() + select.id.len() + select.choices.len() * 6
            }

            Question::Text(text) => {
                let max_n = text.max_n as usize;
                "text::".len()
                    + text.id.len()
                    + (text.max_length as usize + 1) * max_n
                    + text.choices.len().saturating_sub(max_n)
            }
        }
    }
}

/// Select one or several choices
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub id: String,
    pub title: String,
    pub max_n: u16,
    pub min_n: u16,
    pub choices: Vec<String>,
}

/// Rank the choices
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Rank {
    pub id: String,
    pub title: String,
    pub max_n: u16,
    pub min_n: u16,
    pub choices: Vec<String>,
}

/// Free text answers
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Text {
    pub id: String,
    pub title: String,
    pub max_n: u16,
    pub min_n: u16,
    pub max_length: u16,
    #[serde(default)]
    pub regex: String,
    pub choices: Vec<String>,
}
