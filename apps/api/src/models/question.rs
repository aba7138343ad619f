use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of identifiers assigned locally while an add is awaiting the backend.
pub const TEMP_ID_PREFIX: &str = "temp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Knockout,
    Qualifying,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Knockout => "knockout",
            QuestionType::Qualifying => "qualifying",
        }
    }
}

/// Transient annotation describing how a question differs from the previously displayed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    New,
    Updated,
    Unchanged,
}

impl ChangeStatus {
    /// `Unchanged` is stored as an absent tag.
    pub fn normalized(status: Option<ChangeStatus>) -> Option<ChangeStatus> {
        match status {
            Some(ChangeStatus::Unchanged) | None => None,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Server-assigned id, or `temp_<millis>` while an add is pending.
    pub id: String,
    /// Client-side key that survives id swaps, so list consumers keep item identity.
    #[serde(default = "Uuid::new_v4")]
    pub key: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    /// Only meaningful for qualifying questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_status: Option<ChangeStatus>,
}

impl Question {
    pub fn new(id: impl Into<String>, question_type: QuestionType, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: Uuid::new_v4(),
            text: text.into(),
            question_type,
            ideal_answer: None,
            change_status: None,
        }
    }

    pub fn with_ideal_answer(mut self, ideal_answer: impl Into<String>) -> Self {
        self.ideal_answer = Some(ideal_answer.into());
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    pub fn is_highlighted(&self) -> bool {
        matches!(
            self.change_status,
            Some(ChangeStatus::New) | Some(ChangeStatus::Updated)
        )
    }
}

/// A vacancy's screening questions, partitioned by type.
///
/// Each partition is independently ordered; the order is the display and execution order.
/// Ids are unique across both partitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub knockout: Vec<Question>,
    pub qualifying: Vec<Question>,
}

impl QuestionSet {
    pub fn new(knockout: Vec<Question>, qualifying: Vec<Question>) -> Self {
        Self::from_flat(knockout.into_iter().chain(qualifying))
    }

    /// Builds a set from a flattened collection, keeping relative order inside each type.
    pub fn from_flat(questions: impl IntoIterator<Item = Question>) -> Self {
        let mut set = QuestionSet::default();
        for question in questions {
            set.partition_mut(question.question_type).push(question);
        }
        set
    }

    pub fn partition(&self, question_type: QuestionType) -> &[Question] {
        match question_type {
            QuestionType::Knockout => &self.knockout,
            QuestionType::Qualifying => &self.qualifying,
        }
    }

    pub fn partition_mut(&mut self, question_type: QuestionType) -> &mut Vec<Question> {
        match question_type {
            QuestionType::Knockout => &mut self.knockout,
            QuestionType::Qualifying => &mut self.qualifying,
        }
    }

    /// Knockout questions first, then qualifying.
    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.knockout.iter().chain(self.qualifying.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Question> {
        self.knockout.iter_mut().chain(self.qualifying.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.knockout.len() + self.qualifying.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knockout.is_empty() && self.qualifying.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.iter().find(|q| q.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get_by_key(&self, key: Uuid) -> Option<&Question> {
        self.iter().find(|q| q.key == key)
    }

    pub fn get_by_key_mut(&mut self, key: Uuid) -> Option<&mut Question> {
        self.iter_mut().find(|q| q.key == key)
    }

    pub fn push(&mut self, question: Question) {
        self.partition_mut(question.question_type).push(question);
    }

    pub fn remove(&mut self, id: &str) -> Option<Question> {
        for partition in [&mut self.knockout, &mut self.qualifying] {
            if let Some(pos) = partition.iter().position(|q| q.id == id) {
                return Some(partition.remove(pos));
            }
        }
        None
    }

    pub fn remove_by_key(&mut self, key: Uuid) -> Option<Question> {
        for partition in [&mut self.knockout, &mut self.qualifying] {
            if let Some(pos) = partition.iter().position(|q| q.key == key) {
                return Some(partition.remove(pos));
            }
        }
        None
    }

    /// Swaps the id of the question with `key` in place. Returns the previous id.
    pub fn replace_id(&mut self, key: Uuid, new_id: &str) -> Option<String> {
        let question = self.get_by_key_mut(key)?;
        Some(std::mem::replace(&mut question.id, new_id.to_string()))
    }

    pub fn ids(&self, question_type: QuestionType) -> Vec<String> {
        self.partition(question_type)
            .iter()
            .map(|q| q.id.clone())
            .collect()
    }

    pub fn has_unique_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.iter().all(|q| seen.insert(q.id.as_str()))
    }

    /// Copy of the set with every change annotation removed.
    pub fn stripped(&self) -> QuestionSet {
        let mut set = self.clone();
        set.clear_change_status();
        set
    }

    pub fn clear_change_status(&mut self) {
        for question in self.iter_mut() {
            question.change_status = None;
        }
    }

    /// Questions currently tagged `new` or `updated`.
    #[cfg(test)]
    pub fn highlighted(&self) -> impl Iterator<Item = &Question> {
        self.iter().filter(|q| q.is_highlighted())
    }

    /// Reuses the stable key of any question whose id already exists in `previous`.
    pub fn inherit_keys(&mut self, previous: &QuestionSet) {
        let keys: HashMap<&str, Uuid> = previous.iter().map(|q| (q.id.as_str(), q.key)).collect();
        for question in self.iter_mut() {
            if let Some(key) = keys.get(question.id.as_str()) {
                question.key = *key;
            }
        }
    }

    /// Returns the same questions arranged in the given per-type id order.
    ///
    /// Each list must be a permutation of the ids currently in that partition.
    pub fn reordered(&self, knockout: &[String], qualifying: &[String]) -> Result<QuestionSet, String> {
        Ok(QuestionSet {
            knockout: reorder_partition(&self.knockout, knockout, QuestionType::Knockout)?,
            qualifying: reorder_partition(&self.qualifying, qualifying, QuestionType::Qualifying)?,
        })
    }
}

fn reorder_partition(
    current: &[Question],
    order: &[String],
    question_type: QuestionType,
) -> Result<Vec<Question>, String> {
    if order.len() != current.len() {
        return Err(format!(
            "{} order lists {} ids but the set holds {}",
            question_type.as_str(),
            order.len(),
            current.len()
        ));
    }
    let mut seen = HashSet::new();
    order
        .iter()
        .map(|id| {
            if !seen.insert(id.as_str()) {
                return Err(format!("duplicate id '{id}' in {} order", question_type.as_str()));
            }
            current
                .iter()
                .find(|q| &q.id == id)
                .cloned()
                .ok_or_else(|| format!("unknown {} question '{id}'", question_type.as_str()))
        })
        .collect()
}
