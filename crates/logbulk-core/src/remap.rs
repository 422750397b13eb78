use crate::field::{Field, MESSAGE_FIELD};

/// Rename the first field called `msg_field` to [`MESSAGE_FIELD`].
///
/// No-op when `msg_field` is empty or absent from `fields`.
pub fn remap_message_field(msg_field: &str, fields: &mut [Field]) {
    if msg_field.is_empty() {
        return;
    }
    if let Some(field) = fields.iter_mut().find(|f| f.name == msg_field) {
        field.name.clear();
        field.name.push_str(MESSAGE_FIELD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_first_match_only() {
        let mut fields = vec![
            Field::new("level", "info"),
            Field::new("message", "first"),
            Field::new("message", "second"),
        ];
        remap_message_field("message", &mut fields);
        assert_eq!(
            fields,
            vec![
                Field::new("level", "info"),
                Field::new("_msg", "first"),
                Field::new("message", "second"),
            ]
        );
    }

    #[test]
    fn empty_or_missing_name_is_noop() {
        let original = vec![Field::new("message", "x")];

        let mut fields = original.clone();
        remap_message_field("", &mut fields);
        assert_eq!(fields, original);

        remap_message_field("log", &mut fields);
        assert_eq!(fields, original);
    }
}
