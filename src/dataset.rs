//! Dataset records and loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One multiple-choice question. Choices are letter-addressable A–Z, so at
/// most 26 are meaningful; an empty list makes every solver default to 'A'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub qid: String,
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("missing input file {path}: {source}")]
    Missing {
        path: String,
        source: std::io::Error,
    },
    #[error("input must be a JSON array of questions: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Load a dataset from a JSON array file. A missing file or a top-level shape
/// that is not an array of question objects is fatal to the whole run — the
/// only fatal input condition in the pipeline.
pub fn load_questions(path: impl AsRef<Path>) -> Result<Vec<Question>, DatasetError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| DatasetError::Missing {
        path: path.display().to_string(),
        source,
    })?;
    let questions: Vec<Question> = serde_json::from_str(&raw)?;
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_array_with_defaulted_choices() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"[{{"qid":"q1","question":"Câu hỏi?","choices":["a","b"]}},
                {{"qid":"q2","question":"Không có lựa chọn"}}]"#
        )
        .unwrap();

        let qs = load_questions(f.path()).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].qid, "q1");
        assert_eq!(qs[0].choices.len(), 2);
        assert!(qs[1].choices.is_empty());
    }

    #[test]
    fn non_array_top_level_is_fatal() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"qid":"q1"}}"#).unwrap();
        assert!(matches!(
            load_questions(f.path()),
            Err(DatasetError::Malformed(_))
        ));
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            load_questions("/nonexistent/input.json"),
            Err(DatasetError::Missing { .. })
        ));
    }
}
