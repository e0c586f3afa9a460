//! Content catalog accessors.
//!
//! Words, lecturas and audios are stored locally only and filtered by nivel.

use rusqlite::{params, Connection};
use std::sync::Arc;
use tracing::debug;

use nivelver_common::models::validate_answers;
use nivelver_common::{Audio, Error, Lectura, Nivel, Result, Word};

use super::live::{live_query, LiveQuery, Table};
use super::{storage_error, LocalStore};

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl LocalStore {
    /// Add a vocabulary entry.
    pub async fn add_word(&self, spanish: &str, russian: &str, nivel: &Nivel) -> Result<Word> {
        require("Spanish text", spanish)?;
        require("Russian text", russian)?;

        let word = Word {
            id: new_id(),
            spanish: spanish.trim().to_string(),
            russian: russian.trim().to_string(),
            nivel: nivel.as_str().to_string(),
        };

        let record = word.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO words (id, spanish, russian, nivel) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.spanish, record.russian, record.nivel],
            )
            .map_err(storage_error)
        })
        .await?;
        self.feed.notify(Table::Words);

        debug!("Word added: {} ({})", word.id, word.nivel);
        Ok(word)
    }

    /// Add a reading passage with its question.
    pub async fn add_lectura(
        &self,
        text: &str,
        question: &str,
        answers: Vec<String>,
        correct_answer_index: u32,
        nivel: &Nivel,
    ) -> Result<Lectura> {
        require("Text", text)?;
        require("Question", question)?;
        validate_answers(&answers, correct_answer_index)?;

        let lectura = Lectura {
            id: new_id(),
            text: text.to_string(),
            question: question.to_string(),
            answers,
            correct_answer_index,
            nivel: nivel.as_str().to_string(),
        };

        let record = lectura.clone();
        let answers_json = serde_json::to_string(&record.answers)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO lecturas (id, text, question, answers, correct_answer_index, nivel)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.text,
                    record.question,
                    answers_json,
                    record.correct_answer_index,
                    record.nivel
                ],
            )
            .map_err(storage_error)
        })
        .await?;
        self.feed.notify(Table::Lecturas);

        debug!("Lectura added: {} ({})", lectura.id, lectura.nivel);
        Ok(lectura)
    }

    /// Add a listening prompt with its question.
    pub async fn add_audio(
        &self,
        audio_path: &str,
        question: &str,
        answers: Vec<String>,
        correct_answer_index: u32,
        nivel: &Nivel,
    ) -> Result<Audio> {
        require("Audio path", audio_path)?;
        require("Question", question)?;
        validate_answers(&answers, correct_answer_index)?;

        let audio = Audio {
            id: new_id(),
            audio_path: audio_path.to_string(),
            question: question.to_string(),
            answers,
            correct_answer_index,
            nivel: nivel.as_str().to_string(),
        };

        let record = audio.clone();
        let answers_json = serde_json::to_string(&record.answers)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO audios (id, audio_path, question, answers, correct_answer_index, nivel)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.audio_path,
                    record.question,
                    answers_json,
                    record.correct_answer_index,
                    record.nivel
                ],
            )
            .map_err(storage_error)
        })
        .await?;
        self.feed.notify(Table::Audios);

        debug!("Audio added: {} ({})", audio.id, audio.nivel);
        Ok(audio)
    }

    pub async fn list_words_by_nivel(&self, nivel: &Nivel) -> Result<Vec<Word>> {
        let level = nivel.as_str().to_string();
        self.with_conn(move |conn| query_words(conn, &level)).await
    }

    pub async fn list_lecturas_by_nivel(&self, nivel: &Nivel) -> Result<Vec<Lectura>> {
        let level = nivel.as_str().to_string();
        self.with_conn(move |conn| query_lecturas(conn, &level)).await
    }

    pub async fn list_audios_by_nivel(&self, nivel: &Nivel) -> Result<Vec<Audio>> {
        let level = nivel.as_str().to_string();
        self.with_conn(move |conn| query_audios(conn, &level)).await
    }

    /// Live snapshots of the words at a nivel.
    pub fn words_by_nivel(&self, nivel: &Nivel) -> LiveQuery<Word> {
        let level = nivel.as_str().to_string();
        live_query(
            Arc::clone(&self.conn),
            self.feed.subscribe(Table::Words),
            move |conn| query_words(conn, &level),
        )
    }

    /// Live snapshots of the lecturas at a nivel.
    pub fn lecturas_by_nivel(&self, nivel: &Nivel) -> LiveQuery<Lectura> {
        let level = nivel.as_str().to_string();
        live_query(
            Arc::clone(&self.conn),
            self.feed.subscribe(Table::Lecturas),
            move |conn| query_lecturas(conn, &level),
        )
    }

    /// Live snapshots of the audios at a nivel.
    pub fn audios_by_nivel(&self, nivel: &Nivel) -> LiveQuery<Audio> {
        let level = nivel.as_str().to_string();
        live_query(
            Arc::clone(&self.conn),
            self.feed.subscribe(Table::Audios),
            move |conn| query_audios(conn, &level),
        )
    }
}

fn query_words(conn: &Connection, nivel: &str) -> Result<Vec<Word>> {
    let mut stmt = conn
        .prepare("SELECT id, spanish, russian, nivel FROM words WHERE nivel = ?1 ORDER BY spanish")
        .map_err(storage_error)?;
    let words = stmt
        .query_map([nivel], |row| {
            Ok(Word {
                id: row.get(0)?,
                spanish: row.get(1)?,
                russian: row.get(2)?,
                nivel: row.get(3)?,
            })
        })
        .map_err(storage_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_error)?;
    Ok(words)
}

/// Columns shared by lecturas and audios, answers still encoded.
type QuestionRow = (String, String, String, String, u32, String);

fn query_questions(conn: &Connection, sql: &str, nivel: &str) -> Result<Vec<QuestionRow>> {
    let mut stmt = conn.prepare(sql).map_err(storage_error)?;
    let rows = stmt
        .query_map([nivel], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(storage_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_error)?;
    Ok(rows)
}

fn decode_answers(id: &str, raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        Error::LocalStorage(format!("Corrupt answers for record {}: {}", id, e))
    })
}

fn query_lecturas(conn: &Connection, nivel: &str) -> Result<Vec<Lectura>> {
    query_questions(
        conn,
        "SELECT id, text, question, answers, correct_answer_index, nivel
         FROM lecturas WHERE nivel = ?1 ORDER BY rowid",
        nivel,
    )?
    .into_iter()
    .map(|(id, text, question, answers, correct_answer_index, nivel)| {
        let answers = decode_answers(&id, &answers)?;
        Ok(Lectura {
            id,
            text,
            question,
            answers,
            correct_answer_index,
            nivel,
        })
    })
    .collect()
}

fn query_audios(conn: &Connection, nivel: &str) -> Result<Vec<Audio>> {
    query_questions(
        conn,
        "SELECT id, audio_path, question, answers, correct_answer_index, nivel
         FROM audios WHERE nivel = ?1 ORDER BY rowid",
        nivel,
    )?
    .into_iter()
    .map(|(id, audio_path, question, answers, correct_answer_index, nivel)| {
        let answers = decode_answers(&id, &answers)?;
        Ok(Audio {
            id,
            audio_path,
            question,
            answers,
            correct_answer_index,
            nivel,
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup;
    use super::*;
    use futures::StreamExt;

    fn nivel(s: &str) -> Nivel {
        Nivel::new(s).unwrap()
    }

    fn answers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_words_filtered_by_nivel() {
        let store = setup();
        store.add_word("hola", "привет", &nivel("A0")).await.unwrap();
        store.add_word("adiós", "пока", &nivel("A0")).await.unwrap();
        store.add_word("sin embargo", "однако", &nivel("B2")).await.unwrap();

        let a0 = store.list_words_by_nivel(&nivel("A0")).await.unwrap();
        assert_eq!(a0.len(), 2);
        assert!(a0.iter().all(|w| w.nivel == "A0"));

        let c1 = store.list_words_by_nivel(&nivel("C1")).await.unwrap();
        assert!(c1.is_empty());
    }

    #[tokio::test]
    async fn test_blank_word_rejected() {
        let store = setup();
        let err = store.add_word("  ", "пока", &nivel("A0")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.stats().await.unwrap().words, 0);
    }

    #[tokio::test]
    async fn test_lectura_answers_survive_storage() {
        let store = setup();
        let created = store
            .add_lectura(
                "María vive en Madrid.",
                "¿Dónde vive María?",
                answers(&["Madrid", "Lima", "Quito"]),
                0,
                &nivel("A1"),
            )
            .await
            .unwrap();

        let listed = store.list_lecturas_by_nivel(&nivel("A1")).await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn test_audio_answer_index_checked() {
        let store = setup();
        let err = store
            .add_audio("audio/a1.mp3", "¿Qué oyes?", answers(&["sí", "no"]), 5, &nivel("A1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        store
            .add_audio("audio/a1.mp3", "¿Qué oyes?", answers(&["sí", "no"]), 1, &nivel("A1"))
            .await
            .unwrap();
        assert_eq!(store.list_audios_by_nivel(&nivel("A1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_live_words_only_wake_on_words() {
        let store = setup();
        let mut live = store.words_by_nivel(&nivel("A0"));
        assert!(live.next().await.unwrap().unwrap().is_empty());

        store.add_word("gato", "кот", &nivel("A0")).await.unwrap();
        let snapshot = live.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].spanish, "gato");
    }

    #[tokio::test]
    async fn test_live_lecturas_and_audios() {
        let store = setup();
        let mut lecturas = store.lecturas_by_nivel(&nivel("B1"));
        let mut audios = store.audios_by_nivel(&nivel("B1"));
        assert!(lecturas.next().await.unwrap().unwrap().is_empty());
        assert!(audios.next().await.unwrap().unwrap().is_empty());

        store
            .add_lectura("texto", "pregunta", answers(&["a", "b"]), 1, &nivel("B1"))
            .await
            .unwrap();
        store
            .add_audio("b1.ogg", "pregunta", answers(&["a"]), 0, &nivel("B1"))
            .await
            .unwrap();

        assert_eq!(lecturas.next().await.unwrap().unwrap().len(), 1);
        assert_eq!(audios.next().await.unwrap().unwrap().len(), 1);
    }
}
