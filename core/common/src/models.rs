//! Record models shared by the local and cloud stores.

use serde::{Deserialize, Serialize};

/// A user account as stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Primary key, immutable after creation.
    pub username: String,
    /// Credential digest (never plaintext).
    pub password: String,
    /// Proficiency tier label.
    pub nivel: String,
    /// Epoch milliseconds of the most recent mutation known locally.
    pub last_modified: i64,
}

/// Vocabulary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: String,
    pub spanish: String,
    pub russian: String,
    pub nivel: String,
}

/// Reading passage with a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lectura {
    pub id: String,
    pub text: String,
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: u32,
    pub nivel: String,
}

/// Listening prompt with a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audio {
    pub id: String,
    pub audio_path: String,
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: u32,
    pub nivel: String,
}

/// Check that a multiple-choice question has a valid answer key.
pub fn validate_answers(answers: &[String], correct_answer_index: u32) -> crate::Result<()> {
    if answers.is_empty() {
        return Err(crate::Error::Validation(
            "At least one answer is required".to_string(),
        ));
    }
    if answers.iter().any(|a| a.trim().is_empty()) {
        return Err(crate::Error::Validation("Answers cannot be blank".to_string()));
    }
    if correct_answer_index as usize >= answers.len() {
        return Err(crate::Error::Validation(format!(
            "Correct answer index {} out of range for {} answers",
            correct_answer_index,
            answers.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_serialization() {
        let user = User {
            username: "ana".to_string(),
            password: "$argon2id$...".to_string(),
            nivel: "B1".to_string(),
            last_modified: 200,
        };

        let json = serde_json::to_string(&user).unwrap();
        let restored: User = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, user);
    }

    #[test]
    fn test_validate_answers() {
        let answers = vec!["si".to_string(), "no".to_string()];
        assert!(validate_answers(&answers, 1).is_ok());
        assert!(validate_answers(&answers, 2).is_err());
        assert!(validate_answers(&[], 0).is_err());
        assert!(validate_answers(&["".to_string()], 0).is_err());
    }
}
