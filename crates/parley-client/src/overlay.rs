//! Pending-overlay store.
//!
//! Staged edits to name and attributes live next to the committed values and
//! shadow them for reads. Nothing here talks to the network: the conversation
//! calls [`PendingOverlay::commit`] only after the server confirmed a save.
//!
//! # Invariants
//!
//! - Each field is in one of three states: unstaged (reads fall through to
//!   the committed value), staged, or freshly committed. Staging an empty
//!   string or an empty map is a real edit, distinct from unstaged.
//! - A commit moves every staged field at once and leaves nothing staged.

use serde_json::{Map, Value};

use crate::{Attributes, error::ConversationError};

/// A locally proposed value that the server has not confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending<T> {
    /// No edit staged; reads fall through to the committed value.
    Unstaged,
    /// Edit staged, waiting for a save.
    Staged(T),
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self::Unstaged
    }
}

impl<T> Pending<T> {
    /// Staged value, if any.
    pub fn as_staged(&self) -> Option<&T> {
        match self {
            Self::Unstaged => None,
            Self::Staged(value) => Some(value),
        }
    }

    /// Returns true if an edit is staged.
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged(_))
    }

    /// Move the staged value out, leaving the field unstaged.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Self::Unstaged => None,
            Self::Staged(value) => Some(value),
        }
    }
}

/// How [`PendingOverlay::stage_attributes`] combines the new map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageMode {
    /// Staged map becomes exactly the new map.
    #[default]
    Replace,
    /// Staged map becomes the committed map overlaid with the new map; new
    /// keys win. Shallow: nested objects are replaced, not merged.
    Merge,
}

/// Committed and staged name/attributes of one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingOverlay {
    name: Option<String>,
    pending_name: Pending<String>,
    attributes: Attributes,
    pending_attributes: Pending<Attributes>,
}

impl PendingOverlay {
    /// Overlay with committed values and nothing staged.
    pub fn new(name: Option<String>, attributes: Attributes) -> Self {
        Self { name, pending_name: Pending::Unstaged, attributes, pending_attributes: Pending::Unstaged }
    }

    /// Stage a new name.
    pub fn stage_name(&mut self, name: impl Into<String>) {
        self.pending_name = Pending::Staged(name.into());
    }

    /// Stage a whole attribute map.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if `map` is not a JSON object
    pub fn stage_attributes(&mut self, map: Value, mode: StageMode) -> Result<(), ConversationError> {
        let Value::Object(map) = map else {
            return Err(ConversationError::invalid_argument(format!(
                "attributes must be a JSON object, got {}",
                json_kind(&map)
            )));
        };

        let staged = match mode {
            StageMode::Replace => map,
            StageMode::Merge => {
                let mut merged = self.attributes.clone();
                merged.extend(map);
                merged
            },
        };
        self.pending_attributes = Pending::Staged(staged);
        Ok(())
    }

    /// Stage a single attribute.
    ///
    /// Starts from an empty staged map if none exists; the committed map is
    /// not copied in.
    pub fn stage_attribute(&mut self, key: impl Into<String>, value: Value) {
        if let Pending::Staged(map) = &mut self.pending_attributes {
            map.insert(key.into(), value);
        } else {
            let mut map = Map::new();
            map.insert(key.into(), value);
            self.pending_attributes = Pending::Staged(map);
        }
    }

    /// Staged name if present, else committed name.
    pub fn current_name(&self) -> Option<&str> {
        self.pending_name.as_staged().or(self.name.as_ref()).map(String::as_str)
    }

    /// Staged attributes if present, else committed attributes.
    pub fn current_attributes(&self) -> &Attributes {
        self.pending_attributes.as_staged().unwrap_or(&self.attributes)
    }

    /// Last confirmed name.
    pub fn committed_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Last confirmed attributes.
    pub fn committed_attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Staged name state.
    pub fn pending_name(&self) -> &Pending<String> {
        &self.pending_name
    }

    /// Staged attributes state.
    pub fn pending_attributes(&self) -> &Pending<Attributes> {
        &self.pending_attributes
    }

    /// Returns true if any field is staged.
    pub fn has_staged(&self) -> bool {
        self.pending_name.is_staged() || self.pending_attributes.is_staged()
    }

    /// Update payload `{"attr"?: {..}, "name"?: ".."}` for the staged fields.
    ///
    /// `None` when nothing is staged.
    pub fn save_payload(&self) -> Option<Value> {
        if !self.has_staged() {
            return None;
        }

        let mut payload = Map::new();
        if let Some(attributes) = self.pending_attributes.as_staged() {
            payload.insert("attr".to_string(), Value::Object(attributes.clone()));
        }
        if let Some(name) = self.pending_name.as_staged() {
            payload.insert("name".to_string(), Value::String(name.clone()));
        }
        Some(Value::Object(payload))
    }

    /// Move every staged field into the committed values.
    pub fn commit(&mut self) {
        if let Some(name) = self.pending_name.take() {
            self.name = Some(name);
        }
        if let Some(attributes) = self.pending_attributes.take() {
            self.attributes = attributes;
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn overlay() -> PendingOverlay {
        PendingOverlay::new(Some("general".into()), attrs(json!({"color": "red", "size": 1})))
    }

    #[test]
    fn reads_fall_through_when_nothing_staged() {
        let overlay = overlay();
        assert_eq!(overlay.current_name(), Some("general"));
        assert_eq!(overlay.current_attributes()["color"], "red");
        assert!(!overlay.has_staged());
        assert_eq!(overlay.save_payload(), None);
    }

    #[test]
    fn staged_name_shadows_committed_name() {
        let mut overlay = overlay();
        overlay.stage_name("random");

        assert_eq!(overlay.current_name(), Some("random"));
        assert_eq!(overlay.committed_name(), Some("general"));
    }

    #[test]
    fn empty_staged_values_are_still_staged() {
        let mut overlay = overlay();
        overlay.stage_name("");
        overlay.stage_attributes(json!({}), StageMode::Replace).unwrap();

        assert_eq!(overlay.current_name(), Some(""));
        assert!(overlay.current_attributes().is_empty());
        assert!(overlay.has_staged());
    }

    #[test]
    fn replace_discards_committed_keys() {
        let mut overlay = overlay();
        overlay.stage_attributes(json!({"topic": "ops"}), StageMode::Replace).unwrap();

        assert_eq!(overlay.current_attributes(), &attrs(json!({"topic": "ops"})));
    }

    #[test]
    fn merge_overlays_committed_map() {
        let mut overlay = overlay();
        overlay.stage_attributes(json!({"color": "blue", "topic": "ops"}), StageMode::Merge).unwrap();

        assert_eq!(
            overlay.current_attributes(),
            &attrs(json!({"color": "blue", "size": 1, "topic": "ops"}))
        );
    }

    #[test]
    fn merge_is_shallow() {
        let mut overlay =
            PendingOverlay::new(None, attrs(json!({"nested": {"a": 1, "b": 2}})));
        overlay.stage_attributes(json!({"nested": {"a": 9}}), StageMode::Merge).unwrap();

        assert_eq!(overlay.current_attributes()["nested"], json!({"a": 9}));
    }

    #[test]
    fn merge_uses_committed_base_not_staged_map() {
        let mut overlay = overlay();
        overlay.stage_attribute("draft", json!(true));
        overlay.stage_attributes(json!({"topic": "ops"}), StageMode::Merge).unwrap();

        assert!(overlay.current_attributes().get("draft").is_none());
        assert_eq!(overlay.current_attributes()["color"], "red");
    }

    #[test]
    fn non_object_attributes_are_rejected() {
        let mut overlay = overlay();
        for bad in [json!(null), json!([1, 2]), json!("x"), json!(3)] {
            let result = overlay.stage_attributes(bad, StageMode::Replace);
            assert!(matches!(result, Err(ConversationError::InvalidArgument { .. })));
        }
        assert!(!overlay.has_staged());
    }

    #[test]
    fn single_attribute_starts_from_empty_map() {
        let mut overlay = overlay();
        overlay.stage_attribute("topic", json!("ops"));

        assert_eq!(overlay.current_attributes(), &attrs(json!({"topic": "ops"})));
    }

    #[test]
    fn single_attribute_extends_existing_staged_map() {
        let mut overlay = overlay();
        overlay.stage_attributes(json!({"a": 1}), StageMode::Replace).unwrap();
        overlay.stage_attribute("b", json!(2));

        assert_eq!(overlay.current_attributes(), &attrs(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn save_payload_lists_only_staged_fields() {
        let mut overlay = overlay();
        overlay.stage_name("ops");
        insta::assert_snapshot!(overlay.save_payload().unwrap().to_string(), @r#"{"name":"ops"}"#);

        overlay.stage_attribute("topic", json!("deploys"));
        insta::assert_snapshot!(
            overlay.save_payload().unwrap().to_string(),
            @r#"{"attr":{"topic":"deploys"},"name":"ops"}"#
        );
    }

    #[test]
    fn commit_moves_everything_and_clears_pending() {
        let mut overlay = overlay();
        overlay.stage_name("ops");
        overlay.stage_attribute("topic", json!("deploys"));
        overlay.commit();

        assert_eq!(overlay.committed_name(), Some("ops"));
        assert_eq!(overlay.committed_attributes(), &attrs(json!({"topic": "deploys"})));
        assert_eq!(overlay.pending_name(), &Pending::Unstaged);
        assert_eq!(overlay.pending_attributes(), &Pending::Unstaged);
    }

    #[test]
    fn commit_without_staged_fields_changes_nothing() {
        let mut overlay = overlay();
        let before = overlay.clone();
        overlay.commit();
        assert_eq!(overlay, before);
    }
}
