use crate::error::TreeError;
use crate::tree::{NodeId, Tree};
use crate::value::{Binding, Value, ValueCell};
use serde_json::{Value as Json, json};

const SUMMARY_CHARS: usize = 20;

fn summarize(text: String) -> String {
    if text.chars().count() <= SUMMARY_CHARS {
        return text;
    }
    let mut short: String = text.chars().take(SUMMARY_CHARS - 3).collect();
    short.push_str("...");
    short
}

fn summarize_value(value: &Value) -> String {
    summarize(String::from_utf8_lossy(&value.to_text_bytes()).into_owned())
}

fn summarize_cell(cell: &ValueCell) -> Json {
    match cell {
        ValueCell::Unset => Json::Null,
        ValueCell::Literal(value) => json!(summarize_value(value)),
        ValueCell::Deferred(_) => json!("<deferred>"),
        ValueCell::Computed { transform, sources } => {
            json!(format!("{}({})", transform.name(), sources.join(", ")))
        }
        ValueCell::Bound(Binding::Path(path)) => json!(format!("-> {path}")),
        ValueCell::Bound(Binding::Element { index, field, .. }) => {
            json!(format!("-> [{index}].{field}"))
        }
    }
}

impl Tree {
    /// A JSON snapshot of the subtree at `id` for debugging schemas: names,
    /// kinds, abbreviated values and cache contents. Does not resolve anything.
    pub fn describe(&self, id: NodeId) -> Result<Json, TreeError> {
        let node = self.node(id)?;
        let mut out = json!({
            "name": node.name,
            "kind": self.kind_name(id)?,
            "value": summarize_cell(&node.cell),
            "cache": node
                .cache
                .as_ref()
                .map(|bytes| summarize(String::from_utf8_lossy(bytes).into_owned())),
        });
        if let Some(action) = &node.action {
            out["action"] = json!(action.name());
        }
        if node.hidden {
            out["hidden"] = json!(true);
        }
        if self.is_group(id)? {
            out["count"] = json!(node.children.len());
        }
        if !node.children.is_empty() {
            let children = node
                .children
                .iter()
                .map(|&child| self.describe(child))
                .collect::<Result<Vec<_>, _>>()?;
            out["children"] = Json::Array(children);
        }
        Ok(out)
    }
}
