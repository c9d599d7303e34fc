use std::collections::HashMap;

use uuid::Uuid;

use super::types::{FunctionCall, ToolCall};

/// One fragment of model output as decoded from the provider stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            text: None,
            tool_calls: vec![delta],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.tool_calls.is_empty()
    }
}

/// Partial tool-call data addressed by its position in the model's call list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// A tool request reassembled from fragments, ready for dispatch.
///
/// `name` may be empty when the model never sent one; the loop rejects such
/// calls instead of guessing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            tool_type: "function".to_string(),
            function: FunctionCall {
                name: self.name.clone(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Splits a fragment stream into forwardable text and an index-keyed table
/// of partial tool calls.
///
/// The first id and name seen for an index win; argument text is appended in
/// arrival order. Fragment boundaries never change the result.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    calls: HashMap<u32, PartialCall>,
    text_len: usize,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one delta into the table and returns its text, if any.
    pub fn ingest(&mut self, delta: &StreamDelta) -> Option<String> {
        for fragment in &delta.tool_calls {
            let entry = self.calls.entry(fragment.index).or_default();

            if entry.id.is_none() {
                entry.id = fragment.id.clone().filter(|id| !id.is_empty());
            }
            if entry.name.is_none() {
                entry.name = fragment.name.clone().filter(|name| !name.is_empty());
            }
            if let Some(arguments) = &fragment.arguments {
                entry.arguments.push_str(arguments);
            }
        }

        let text = delta.text.as_deref().filter(|text| !text.is_empty())?;
        self.text_len += text.len();
        Some(text.to_string())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Bytes of text forwarded so far.
    pub fn text_len(&self) -> usize {
        self.text_len
    }

    /// Closes the stream and returns reassembled calls by ascending index.
    pub fn finish(self) -> Vec<PendingToolCall> {
        let mut calls: Vec<_> = self.calls.into_iter().collect();
        calls.sort_by_key(|(index, _)| *index);

        calls
            .into_iter()
            .map(|(index, partial)| PendingToolCall {
                index,
                id: partial
                    .id
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                name: partial.name.unwrap_or_default(),
                arguments: partial.arguments,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamDelta {
        StreamDelta::tool_call(ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.map(str::to_string),
        })
    }

    #[test]
    fn text_is_returned_in_order() {
        let mut acc = DeltaAccumulator::new();
        let mut out = String::new();
        for piece in ["Hel", "lo", " world"] {
            out.push_str(&acc.ingest(&StreamDelta::text(piece)).unwrap());
        }
        assert_eq!(out, "Hello world");
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn empty_delta_is_a_no_op() {
        let mut acc = DeltaAccumulator::new();
        assert_eq!(acc.ingest(&StreamDelta::default()), None);
        assert_eq!(acc.ingest(&StreamDelta::text("")), None);
        assert!(!acc.has_tool_calls());
        assert_eq!(acc.text_len(), 0);
    }

    #[test]
    fn fragmented_call_is_reassembled() {
        let mut acc = DeltaAccumulator::new();
        acc.ingest(&fragment(0, Some("call_1"), Some("lookupChampion"), None));
        acc.ingest(&fragment(0, None, None, Some(r#"{"name":"#)));
        acc.ingest(&fragment(0, None, None, Some(r#""Ahri"}"#)));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "lookupChampion");
        assert_eq!(calls[0].arguments, r#"{"name":"Ahri"}"#);
    }

    #[test]
    fn reassembly_ignores_fragment_boundaries() {
        let args = r#"{"name":"Ahri","region":"kr"}"#;

        for split in 1..args.len() {
            let mut acc = DeltaAccumulator::new();
            acc.ingest(&fragment(0, Some("c"), Some("lookupChampion"), None));
            acc.ingest(&fragment(0, None, None, Some(&args[..split])));
            acc.ingest(&fragment(0, None, None, Some(&args[split..])));
            let calls = acc.finish();
            assert_eq!(calls[0].arguments, args, "split at {split}");
        }
    }

    #[test]
    fn first_id_and_name_win() {
        let mut acc = DeltaAccumulator::new();
        acc.ingest(&fragment(0, Some("first"), Some("alpha"), None));
        acc.ingest(&fragment(0, Some("second"), Some("beta"), Some("{}")));

        let calls = acc.finish();
        assert_eq!(calls[0].id, "first");
        assert_eq!(calls[0].name, "alpha");
    }

    #[test]
    fn interleaved_indices_sort_ascending() {
        let mut acc = DeltaAccumulator::new();
        acc.ingest(&fragment(1, Some("b"), Some("second"), Some("{")));
        acc.ingest(&fragment(0, Some("a"), Some("first"), Some("{")));
        acc.ingest(&fragment(1, None, None, Some("}")));
        acc.ingest(&fragment(0, None, None, Some("}")));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].arguments, "{}");
    }

    #[test]
    fn text_and_tool_fragments_interleave() {
        let mut acc = DeltaAccumulator::new();
        let delta = StreamDelta {
            text: Some("Checking".to_string()),
            tool_calls: vec![ToolCallDelta {
                index: 0,
                name: Some("lookupChampion".to_string()),
                ..Default::default()
            }],
        };
        assert_eq!(acc.ingest(&delta).as_deref(), Some("Checking"));
        assert!(acc.has_tool_calls());
    }

    #[test]
    fn missing_id_is_synthesized_and_missing_name_kept_empty() {
        let mut acc = DeltaAccumulator::new();
        acc.ingest(&fragment(0, None, None, Some("{}")));

        let calls = acc.finish();
        assert!(calls[0].id.starts_with("call_"));
        assert!(calls[0].name.is_empty());
    }
}
