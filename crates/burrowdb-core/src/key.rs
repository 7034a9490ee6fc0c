//! Storage-key naming. The literal formats here are an internal wire-format
//! choice; nothing ever parses a primary key back out of a record key, so
//! primary keys may contain any characters including the separator.

/// Key of the hash holding one record: `{model}:{pk}`.
#[must_use]
pub fn record_key(model: &str, primary_key: &str) -> String {
    format!("{model}:{primary_key}")
}

/// Key of the per-model insertion-ordered index set.
#[must_use]
pub fn index_key(model: &str) -> String {
    format!("{model}:__index")
}

/// Key of the per-model sequence counter that scores index entries.
#[must_use]
pub fn counter_key(model: &str) -> String {
    format!("{model}:__seq")
}

/// The model component of a record key, used by backends to pick the right
/// pointer descriptors while chasing nested references. Record keys always
/// contain the separator; index and counter keys share the same shape.
#[must_use]
pub fn model_of_key(key: &str) -> Option<&str> {
    key.split_once(':').map(|(model, _)| model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_embed_model_and_pk() {
        assert_eq!(record_key("book", "Emma"), "book:Emma");
        assert_eq!(index_key("book"), "book:__index");
        assert_eq!(counter_key("book"), "book:__seq");
    }

    #[test]
    fn model_extraction_splits_on_first_separator() {
        assert_eq!(model_of_key("book:Emma"), Some("book"));
        assert_eq!(
            model_of_key("book:a:b"),
            Some("book"),
            "pk may contain the separator"
        );
        assert_eq!(model_of_key("no-separator"), None);
    }
}
