use chrono::Duration;
use mockall::mock;
use vendi_common::Paise;
use vendi_payment_engine::{
    db_types::{
        Item,
        Machine,
        MachineCode,
        NewOrder,
        NewPayment,
        Order,
        OrderId,
        OrderItemLine,
        OrderStatusEntry,
        OrderStatusType,
        Payment,
        PaymentStatusEntry,
        StatusActor,
    },
    traits::{
        CheckoutSession,
        DispenseStart,
        FailedPaymentNotice,
        GatewayClientError,
        GatewayPayment,
        OrderFlowDatabase,
        OrderFlowError,
        PaymentConfirmation,
        PaymentDatabase,
        PaymentGatewayClient,
        VerifiedPaymentNotice,
    },
};

mock! {
    pub OrderFlowDb {}
    impl OrderFlowDatabase for OrderFlowDb {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder, lines: &[OrderItemLine]) -> Result<Order, OrderFlowError>;
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;
        async fn fetch_latest_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError>;
        async fn fetch_blocking_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError>;
        async fn transition_order(&self, order_id: &OrderId, target: OrderStatusType, actor: StatusActor, reason: &str) -> Result<Order, OrderFlowError>;
        async fn start_dispense(&self, machine: &Machine, pickup_code: &str) -> Result<DispenseStart, OrderFlowError>;
        async fn complete_dispense(&self, order_id: &OrderId) -> Result<Order, OrderFlowError>;
        async fn expire_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, OrderFlowError>;
        async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError>;
        async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItemLine>, OrderFlowError>;
        async fn fetch_machine(&self, code: &MachineCode) -> Result<Option<Machine>, OrderFlowError>;
        async fn fetch_item(&self, item_id: i64) -> Result<Option<Item>, OrderFlowError>;
    }
}

mock! {
    pub PaymentDb {}
    impl PaymentDatabase for PaymentDb {
        async fn insert_pending_payment(&self, payment: NewPayment) -> Result<Payment, OrderFlowError>;
        async fn fetch_payment_by_gateway_payment_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>, OrderFlowError>;
        async fn fetch_payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, OrderFlowError>;
        async fn fetch_payment_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, OrderFlowError>;
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;
        async fn record_verified_payment(&self, notice: &VerifiedPaymentNotice) -> Result<PaymentConfirmation, OrderFlowError>;
        async fn record_failed_payment(&self, notice: &FailedPaymentNotice) -> Result<Option<Payment>, OrderFlowError>;
    }
}

mock! {
    pub GatewayClient {}
    impl PaymentGatewayClient for GatewayClient {
        async fn create_checkout_session(&self, amount: Paise, currency: &str, reference: &OrderId) -> Result<CheckoutSession, GatewayClientError>;
        async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayClientError>;
    }
}
