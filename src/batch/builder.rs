//! Call Builder Module
//!
//! Turns a hook event into the ordered call list and capabilities of one
//! batch. The three flows differ only in which calls they include:
//! - booking created: token approval, then the booking call (atomic)
//! - booking completed: the completion call (atomic)
//! - event type created: the registration call

use crate::{
    BatchKind, CallDescriptor, Capabilities, DataCallback, HookEvent, PaymasterService, RecordId,
    config::WalletConfig, contracts::approve_call,
};
use ethers::types::{Address, U64};

/// Attributes the wallet collects from the user when paying for a booking
pub const BOOKING_DATA_REQUESTS: [&str; 2] = ["email", "name"];

/// Everything needed to submit one batch
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub kind: BatchKind,
    pub record_id: RecordId,
    pub from: Address,
    pub chain_id: U64,
    pub calls: Vec<CallDescriptor>,
    pub atomic_required: bool,
    pub capabilities: Capabilities,
}

/// Builds batches for hook events
#[derive(Debug, Clone)]
pub struct CallBuilder {
    chain_id: U64,
    /// Token bookings are paid in
    payment_token: Address,
    paymaster_url: Option<String>,
}

impl CallBuilder {
    pub fn new(config: &WalletConfig) -> Self {
        Self {
            chain_id: U64::from(config.chain_id),
            payment_token: config.payment_token,
            paymaster_url: config.paymaster_url.clone(),
        }
    }

    /// Build the batch for `event`
    ///
    /// The approval of a booking payment always precedes the booking call,
    /// and both are submitted atomically so the allowance never outlives a
    /// failed booking.
    pub fn build(&self, event: &HookEvent) -> PreparedBatch {
        let (calls, atomic_required, data_callback) = match event {
            HookEvent::BookingCreated(booking) => (
                vec![
                    approve_call(self.payment_token, booking.to, booking.price_at_booking),
                    CallDescriptor::new(booking.to, booking.data.clone()),
                ],
                true,
                Some(DataCallback::required(BOOKING_DATA_REQUESTS)),
            ),
            HookEvent::BookingCompleted(booking) => {
                (vec![CallDescriptor::new(booking.to, booking.data.clone())], true, None)
            }
            HookEvent::EventTypeCreated(event_type) => {
                (vec![CallDescriptor::new(event_type.to, event_type.data.clone())], false, None)
            }
        };

        PreparedBatch {
            kind: event.kind(),
            record_id: event.record_id().clone(),
            from: event.from_address(),
            chain_id: self.chain_id,
            calls,
            atomic_required,
            capabilities: Capabilities {
                paymaster_service: self.paymaster_url.clone().map(|url| PaymasterService { url }),
                data_callback,
            },
        }
    }
}
