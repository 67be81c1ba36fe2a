//! Plaintext ballot wire format.
//!
//! A ballot is a list of newline separated records `<kind>:<question-id>:<values>`
//! where `<values>` is a comma separated list:
//!
//! ```text
//! select:q1:true,false,false
//! rank:q2:0,2,1,-1
//! text:q3:hello,world
//! ```
//!
//! Text answers are not escaped: an answer containing `,` is read back as two
//! answers, and `:` or a newline makes the record unreadable.
//!
//! An empty ballot encodes to the empty string. An empty `<values>` field is
//! an empty list for select and rank records, and a single empty answer for
//! text records.

use crate::BallotError;

/// A decoded answer set
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Ballot {
    /// Question ids of `select_result`, index-aligned
    pub select_result_ids: Vec<String>,

    /// For each select question, whether each choice has been selected
    pub select_result: Vec<Vec<bool>>,

    /// Question ids of `rank_result`, index-aligned
    pub rank_result_ids: Vec<String>,

    /// For each rank question, the rank of each choice. Negative means unranked.
    pub rank_result: Vec<Vec<i8>>,

    /// Question ids of `text_result`, index-aligned
    pub text_result_ids: Vec<String>,

    /// For each text question, the answer for each choice
    pub text_result: Vec<Vec<String>>,
}

impl Ballot {
    /// Decode a marshalled ballot that must fit in `ballot_size` bytes
    pub fn decode(marshalled: &str, ballot_size: usize) -> Result<Ballot, BallotError> {
        if marshalled.len() > ballot_size {
            return Err(BallotError::OversizeBallot {
                size: marshalled.len(),
                max: ballot_size,
            });
        }

        let mut ballot = Ballot::default();
        if marshalled.is_empty() {
            return Ok(ballot);
        }

        for line in marshalled.split('\n') {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() != 3 {
                return Err(BallotError::MalformedRecord(line.to_string()));
            }
            let (kind, question, values) = (fields[0], fields[1], fields[2]);

            match kind {
                "select" => {
                    let selections = split_values(values)
                        .map(|value| {
                            parse_bool(value).ok_or_else(|| invalid_value(question, value))
                        })
                        .collect::<Result<Vec<bool>, BallotError>>()?;

                    ballot.select_result_ids.push(question.to_string());
                    ballot.select_result.push(selections);
                }
                "rank" => {
                    let ranks = split_values(values)
                        .map(|value| {
                            value
                                .parse::<i8>()
                                .map_err(|_| invalid_value(question, value))
                        })
                        .collect::<Result<Vec<i8>, BallotError>>()?;

                    ballot.rank_result_ids.push(question.to_string());
                    ballot.rank_result.push(ranks);
                }
                "text" => {
                    ballot.text_result_ids.push(question.to_string());
                    ballot
                        .text_result
                        .push(values.split(',').map(str::to_string).collect());
                }
                _ => return Err(BallotError::UnknownQuestionKind(kind.to_string())),
            }
        }

        Ok(ballot)
    }

    /// Encode the ballot: select records first, then rank, then text
    pub fn encode(&self) -> String {
        let mut lines = Vec::new();

        for (id, selections) in self.select_result_ids.iter().zip(&self.select_result) {
            let values: Vec<&str> = selections
                .iter()
                .map(|s| if *s { "true" } else { "false" })
                .collect();
            lines.push(format!("select:{}:{}", id, values.join(",")));
        }

        for (id, ranks) in self.rank_result_ids.iter().zip(&self.rank_result) {
            let values: Vec<String> = ranks.iter().map(i8::to_string).collect();
            lines.push(format!("rank:{}:{}", id, values.join(",")));
        }

        for (id, texts) in self.text_result_ids.iter().zip(&self.text_result) {
            lines.push(format!("text:{}:{}", id, texts.join(",")));
        }

        lines.join("\n")
    }
}

fn split_values(values: &str) -> impl Iterator<Item = &str> {
    values.split(',').filter(move |_| !values.is_empty())
}

fn invalid_value(question: &str, value: &str) -> BallotError {
    BallotError::InvalidValue {
        question: question.to_string(),
        value: value.to_string(),
    }
}

// Same literals as Go's strconv.ParseBool, which clients historically emit
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
