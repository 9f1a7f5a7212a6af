// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

pub mod descriptor;
pub mod fee;
pub mod iscn_id;
pub mod tx;

pub use descriptor::{ContentDescriptor, ValidationError};
pub use fee::{BASE_UNIT_EXPONENT, FeeQuote, FeeSchedule};
pub use iscn_id::{IscnId, IscnIdError};
pub use tx::{AccountInfo, BroadcastResult, SignedTx, SignerData, SignerIdentity};
