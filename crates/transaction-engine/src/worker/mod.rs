pub mod hook_outbox_worker;
pub mod payment_expire_worker;

pub use hook_outbox_worker::HookOutboxWorker;
pub use payment_expire_worker::PaymentExpireWorker;
