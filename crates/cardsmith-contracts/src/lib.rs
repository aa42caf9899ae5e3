pub mod card;
pub mod events;
pub mod prediction;
pub mod receipts;
pub mod scenario;
