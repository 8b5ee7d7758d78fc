pub mod abi;
pub mod decoder;
pub mod pair;
pub mod reserves;

pub use decoder::decode_swap_calldata;
pub use pair::VenuePairOps;
pub use reserves::{max_trade_amount, mid_price, reserves_key, ReserveKey, ReserveView};
