pub mod accounts;
pub mod address;
pub mod constants;
pub mod discriminator;
pub mod encoder;
pub mod error;
pub mod instruction;
pub mod layout;
pub mod transaction;

pub use accounts::{ProtocolState, StakingPoolAccount, TokenAccount, UserStakeAccount};
pub use constants::*;
pub use error::ProtocolError;
pub use instruction::{StakingKeys, VoteChoice};
pub use transaction::TransactionDraft;
