use debug_console::{OutputCategory, OutputEvent, Variable, VariablesArguments};
use pretty_assertions::assert_eq;
use serde_json::json;

#[cfg(test)]
mod wire_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn variable_deserializes_from_adapter_json() {
        let variable: Variable = serde_json::from_value(json!({
            "name": "items",
            "value": "Array(250)",
            "type": "array",
            "variablesReference": 42,
            "indexedVariables": 250
        }))
        .unwrap();

        assert_eq!(variable.name, "items");
        assert_eq!(variable.ty.as_deref(), Some("array"));
        assert_eq!(variable.variables_reference, 42);
        assert_eq!(variable.indexed_variables, Some(250));
        assert_eq!(variable.named_variables, None);
        assert!(!variable.is_leaf());
    }

    #[test]
    fn missing_reference_defaults_to_leaf() {
        let variable: Variable = serde_json::from_value(json!({
            "name": "count",
            "value": "3"
        }))
        .unwrap();

        assert_eq!(variable.variables_reference, 0);
        assert!(variable.is_leaf());
    }

    #[test]
    fn indexed_arguments_serialize_camel_case() {
        let wire = serde_json::to_value(&VariablesArguments::indexed(42, 100, 50)).unwrap();

        assert_eq!(
            wire,
            json!({
                "variablesReference": 42,
                "filter": "indexed",
                "start": 100,
                "count": 50
            })
        );
    }

    #[test]
    fn unfiltered_arguments_omit_optional_fields() {
        let wire = serde_json::to_value(&VariablesArguments::all(7)).unwrap();

        assert_eq!(wire, json!({ "variablesReference": 7 }));
        let back: VariablesArguments = serde_json::from_value(wire).unwrap();
        assert_eq!(back.filter, None);
        assert_eq!(back.start, None);
    }

    #[test]
    fn output_event_defaults_category_and_keeps_data() {
        let event: OutputEvent = serde_json::from_value(json!({
            "output": "session started\n",
            "data": { "exitCode": 0 }
        }))
        .unwrap();

        assert_eq!(event.category, OutputCategory::Console);
        assert_eq!(event.data, Some(json!({ "exitCode": 0 })));
        assert_eq!(event.variables_reference, None);
    }
}
