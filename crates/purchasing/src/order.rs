use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use orders_storage_core::{DomainError, DomainResult, OrderId};

/// Purchase order workflow status.
///
/// Only `Pending` orders are being line-numbered; `Open` and `Closed` orders
/// are finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Open,
    Closed,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "Pending",
            WorkflowStatus::Open => "Open",
            WorkflowStatus::Closed => "Closed",
        }
    }
}

impl core::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase order record.
///
/// Only `id` and `workflowStatus` are interpreted here. Every other attribute
/// is carried verbatim in `attributes` and stored alongside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,

    #[serde(default)]
    pub workflow_status: WorkflowStatus,

    #[serde(flatten)]
    pub attributes: Map<String, JsonValue>,
}

impl PurchaseOrder {
    pub fn new(workflow_status: WorkflowStatus) -> Self {
        Self {
            id: None,
            workflow_status,
            attributes: Map::new(),
        }
    }

    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Return the order id, generating one first if the order has none.
    pub fn ensure_id(&mut self) -> OrderId {
        *self.id.get_or_insert_with(OrderId::new)
    }

    /// Bind the order to the id addressed by the caller.
    ///
    /// An order without an id adopts `id`; an order carrying a different id is
    /// rejected.
    pub fn bind_to(&mut self, id: OrderId) -> DomainResult<()> {
        match self.id {
            None => {
                self.id = Some(id);
                Ok(())
            }
            Some(existing) if existing == id => Ok(()),
            Some(existing) => Err(DomainError::validation(format!(
                "order id {existing} does not match addressed id {id}"
            ))),
        }
    }

    /// Full JSON document as persisted in the order row.
    pub fn to_document(&self) -> DomainResult<JsonValue> {
        serde_json::to_value(self)
            .map_err(|e| DomainError::validation(format!("order serialization failed: {e}")))
    }

    pub fn from_document(document: JsonValue) -> DomainResult<Self> {
        serde_json::from_value(document)
            .map_err(|e| DomainError::validation(format!("order deserialization failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_defaults_to_pending_without_id() {
        let order = PurchaseOrder::from_document(json!({})).unwrap();
        assert_eq!(order.id, None);
        assert_eq!(order.workflow_status, WorkflowStatus::Pending);
        assert!(order.attributes.is_empty());
    }

    #[test]
    fn unknown_attributes_survive_a_round_trip() {
        let document = json!({
            "id": "6e4e5d8f-3f0a-4a4b-9d55-1c2d3e4f5a6b",
            "workflowStatus": "Open",
            "poNumber": "10000",
            "vendor": { "code": "AMAZ" }
        });

        let order = PurchaseOrder::from_document(document.clone()).unwrap();
        assert_eq!(order.workflow_status, WorkflowStatus::Open);
        assert_eq!(order.attributes["poNumber"], json!("10000"));
        assert_eq!(order.to_document().unwrap(), document);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = PurchaseOrder::from_document(json!({ "workflowStatus": "Cancelled" })).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn ensure_id_generates_once() {
        let mut order = PurchaseOrder::new(WorkflowStatus::Pending);
        let first = order.ensure_id();
        assert_eq!(order.ensure_id(), first);
        assert_eq!(order.id, Some(first));
    }

    #[test]
    fn bind_to_adopts_or_rejects() {
        let id = OrderId::new();

        let mut unbound = PurchaseOrder::new(WorkflowStatus::Closed);
        unbound.bind_to(id).unwrap();
        assert_eq!(unbound.id, Some(id));

        let mut same = PurchaseOrder::new(WorkflowStatus::Closed).with_id(id);
        assert!(same.bind_to(id).is_ok());

        let mut other = PurchaseOrder::new(WorkflowStatus::Closed).with_id(OrderId::new());
        assert!(matches!(other.bind_to(id), Err(DomainError::Validation(_))));
    }
}
