use common::misc::ServerKind;

/// Account name requested on the backend for an order. The same (user, order)
/// pair always yields the same name, and no two orders share one.
pub fn account_identity(kind: ServerKind, user_external_id: i64, order_id: i64) -> String {
    format!("{}_{}_{}", kind.account_prefix(), user_external_id, order_id)
}

/// Name recorded for subscriptions issued by an operator.
pub fn manual_identity(user_external_id: i64, order_id: i64) -> String {
    format!("manual_{}_{}", user_external_id, order_id)
}
