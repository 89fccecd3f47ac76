use common::misc::PaymentMethod;

pub struct OrderCreateRequest {
    pub user_id: i64,
    pub plan_id: i64,
    pub amount: f64,
    pub payment_method: PaymentMethod,
}
