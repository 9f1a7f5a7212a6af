// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use registrar_core::{ContentDescriptor, FeeQuote, FeeSchedule};

use crate::client::ServiceError;
use crate::ledger::TxSigner;

/// Quotes the cost of registering a record without broadcasting anything.
pub struct FeeEstimator {
    signer: Arc<dyn TxSigner>,
    schedule: FeeSchedule,
}

impl FeeEstimator {
    pub fn new(signer: Arc<dyn TxSigner>, schedule: FeeSchedule) -> Self {
        Self { signer, schedule }
    }

    pub async fn estimate(&self, payload: &ContentDescriptor) -> Result<FeeQuote, ServiceError> {
        let estimate = self.signer.estimate_record_tx(payload).await?;
        Ok(FeeQuote::new(
            estimate.record_fee_amount,
            estimate.gas_fee_amount,
            self.schedule.transfer_allowance(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSigner;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn quote_includes_transfer_allowance() {
        let signer = Arc::new(FakeSigner::default().with_estimate(
            Decimal::from(1_500_000_u64),
            Decimal::from(8_000_000_u64),
        ));
        let estimator = FeeEstimator::new(signer.clone(), FeeSchedule::default());

        let quote = estimator
            .estimate(&ContentDescriptor::default())
            .await
            .expect("quote");

        assert_eq!(quote.gas_fee_amount, Decimal::from(1_500_000_u64));
        assert_eq!(quote.record_fee_amount, Decimal::from(8_000_000_u64));
        assert_eq!(quote.transfer_allowance_amount, Decimal::from(2_000_000_u64));
        assert_eq!(quote.total_amount, Decimal::from(11_500_000_u64));
        assert!(signer.signed().is_empty(), "estimation must not sign anything");
    }

    #[tokio::test]
    async fn signer_failure_is_propagated() {
        let signer = Arc::new(FakeSigner::default());
        signer.fail_estimates(true);
        let estimator = FeeEstimator::new(signer, FeeSchedule::default());

        assert!(estimator.estimate(&ContentDescriptor::default()).await.is_err());
    }
}
