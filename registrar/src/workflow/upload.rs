// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info};

use registrar_core::fee::{to_base_units, to_display};
use registrar_core::{BroadcastResult, SignerData};

use super::registration::build_descriptor;
use super::{Registrar, RegistrationOutcome, RegistrationRequest, UploadContext, WorkflowError};
use crate::archive::ArchiveFile;
use crate::journal::{LikeAmount, RegistrarEvent};
use crate::tx_sequencer::SequencerError;

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub files: Vec<ArchiveFile>,
    pub deduplicate: bool,
    pub registration: RegistrationRequest,
}

impl Registrar {
    /// Archives the files, pays for the archive when needed, then registers
    /// a record fingerprinting both the archive id and the content hash.
    pub async fn upload(&self, request: UploadRequest) -> Result<RegistrationOutcome, WorkflowError> {
        let archive = self
            .archive
            .clone()
            .ok_or(WorkflowError::ArchiveNotConfigured)?;
        let UploadRequest {
            files,
            deduplicate,
            mut registration,
        } = request;
        build_descriptor(&registration)?;

        let (ipfs_hash, estimate) = tokio::try_join!(
            archive.content_hash(&files),
            archive.estimate(&files, deduplicate)
        )
        .map_err(|source| WorkflowError::Downstream {
            service: "archive",
            source,
        })?;

        if let Some(archive_id) = estimate.existing_id.clone() {
            info!(%archive_id, %ipfs_hash, "content already archived, skipping payment");
            registration.upload = UploadContext {
                archive_id: Some(archive_id),
                ipfs_hash: Some(ipfs_hash),
                upload_price: None,
            };
            return self.register(registration).await;
        }

        let price = estimate
            .price
            .ok_or(WorkflowError::ArchivePriceUnavailable)?;

        if registration.estimate {
            let send_allowance = to_display(self.config.fee_schedule.send_allowance());
            registration.upload = UploadContext {
                archive_id: None,
                ipfs_hash: Some(ipfs_hash),
                upload_price: Some(price + send_allowance),
            };
            return self.register(registration).await;
        }

        if self.config.chain_upgrading {
            return Err(WorkflowError::ChainUpgrading);
        }
        let target = self
            .config
            .archive_target_address
            .clone()
            .ok_or(WorkflowError::ArchiveNotConfigured)?;

        let amount = to_base_units(price).ok_or_else(|| {
            error!(%price, "archive price does not fit in base units");
            WorkflowError::ArchivePriceUnavailable
        })?;

        let memo = serde_json::json!({ "ipfs": ipfs_hash }).to_string();
        let (payment, uploaded, pinned) = tokio::join!(
            self.submit_payment(&target, amount, &memo),
            archive.upload(&files, &estimate.existing_entries, deduplicate),
            archive.pin(&files)
        );
        let payment = payment.map_err(|source| WorkflowError::Broadcast { source })?;
        let tx_hash = payment.transaction_hash.clone();
        let uploaded = uploaded
            .and_then(|uploaded| pinned.map(|()| uploaded))
            .map_err(|source| {
                error!(%tx_hash, error = %source, "archive upload failed after payment");
                WorkflowError::UploadAfterPayment {
                    tx_hash: tx_hash.clone(),
                    source,
                }
            })?;

        self.publish_upload_paid(
            &registration,
            &payment,
            &ipfs_hash,
            &estimate.key,
            &uploaded.archive_id,
            estimate.native_price.clone(),
            price,
        );

        registration.upload = UploadContext {
            archive_id: Some(uploaded.archive_id),
            ipfs_hash: Some(ipfs_hash),
            upload_price: None,
        };
        self.register(registration).await
    }

    async fn submit_payment(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
    ) -> Result<BroadcastResult, SequencerError> {
        let signer = Arc::clone(&self.signer);
        let to = to.to_string();
        let memo = memo.to_string();
        self.sequencer
            .submit("send", move |data: SignerData| {
                let signer = Arc::clone(&signer);
                let to = to.clone();
                let memo = memo.clone();
                async move { signer.sign_send(&to, amount, &memo, &data).await }
            })
            .await
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_upload_paid(
        &self,
        registration: &RegistrationRequest,
        payment: &BroadcastResult,
        ipfs_hash: &str,
        key: &str,
        archive_id: &str,
        native_price: Option<String>,
        price: Decimal,
    ) {
        let gas_fee = self.config.fee_schedule.gas_fee(payment.gas_wanted);
        self.publisher.publish(RegistrarEvent::UploadPaid {
            tx_hash: payment.transaction_hash.clone(),
            ipfs_hash: ipfs_hash.to_string(),
            key: key.to_string(),
            archive_id: archive_id.to_string(),
            native_price,
            price: LikeAmount::from_display(price),
            gas_fee: LikeAmount::from_base_units(gas_fee),
            total: LikeAmount::from_display(price + to_display(gas_fee)),
            gas_used: payment.gas_used,
            gas_wanted: payment.gas_wanted,
            requester: registration.requester.clone(),
            provider: registration.provider.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, ArchiveEstimate};
    use crate::testing::{FakeArchive, TestHarness};
    use crate::workflow::Registration;
    use serde_json::{Value, json};
    use std::str::FromStr;

    fn upload_request(estimate: bool) -> UploadRequest {
        UploadRequest {
            files: vec![ArchiveFile {
                name: "index.html".to_string(),
                content_type: "text/html".to_string(),
                data: b"<html></html>".to_vec(),
            }],
            deduplicate: true,
            registration: RegistrationRequest {
                metadata: json!({ "name": "Uploaded" }),
                owner_wallet: Some("like1owner".to_string()),
                requester: "api-client".to_string(),
                provider: None,
                claim: false,
                estimate,
                upload: UploadContext::default(),
            },
        }
    }

    fn priced_archive() -> FakeArchive {
        FakeArchive::new("QmHash").with_estimate(ArchiveEstimate {
            key: "key-1".to_string(),
            existing_id: None,
            price: Some(Decimal::from_str("2.5").expect("decimal")),
            native_price: Some("0.0001".to_string()),
            existing_entries: vec![ArchiveEntry {
                key: "old".to_string(),
                archive_id: "old-ar".to_string(),
            }],
        })
    }

    fn registered(outcome: RegistrationOutcome) -> Registration {
        match outcome {
            RegistrationOutcome::Registered(registration) => registration,
            other => panic!("expected registration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pays_uploads_and_registers_with_fingerprints() {
        let harness = TestHarness::builder().archive(priced_archive()).build();

        let registration =
            registered(harness.registrar.upload(upload_request(false)).await.expect("upload"));

        assert_eq!(registration.receipt.archive_id.as_deref(), Some("ar-QmHash"));
        assert_eq!(registration.receipt.ipfs_hash.as_deref(), Some("QmHash"));
        assert_eq!(registration.receipt.tx_hash, harness.ledger_hash(11));

        let signed = harness.signer.signed();
        assert_eq!(signed[0].kind, "send");
        assert_eq!(signed[0].target.as_deref(), Some(TestHarness::ARCHIVE_TARGET));
        assert_eq!(signed[0].amount, Some(Decimal::from(2_500_000_000_u64)));
        let memo: Value =
            serde_json::from_str(signed[0].memo.as_deref().expect("memo")).expect("memo json");
        assert_eq!(memo, json!({ "ipfs": "QmHash" }));
        assert_eq!(signed[1].kind, "create_record");

        let payload = harness.signer.last_record_payload().expect("payload");
        assert_eq!(
            payload.content_fingerprints,
            vec![json!("ar://ar-QmHash"), json!("ipfs://QmHash")]
        );
        assert_eq!(
            harness.publisher.log_types(),
            vec!["arweaveFreeUpload", "ISCNFreeRegister"]
        );
        assert_eq!(harness.archive().expect("archive").uploaded_with(), vec!["old-ar".to_string()]);
    }

    #[tokio::test]
    async fn existing_archive_skips_payment() {
        let archive = FakeArchive::new("QmHash").with_estimate(ArchiveEstimate {
            existing_id: Some("ar-existing".to_string()),
            ..ArchiveEstimate::default()
        });
        let harness = TestHarness::builder().archive(archive).build();

        let registration =
            registered(harness.registrar.upload(upload_request(false)).await.expect("upload"));

        assert_eq!(registration.receipt.archive_id.as_deref(), Some("ar-existing"));
        let signed = harness.signer.signed();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].kind, "create_record");
        assert!(!harness.publisher.log_types().contains(&"arweaveFreeUpload"));
    }

    #[tokio::test]
    async fn estimate_adds_archive_price_and_send_allowance() {
        let harness = TestHarness::builder()
            .archive(priced_archive())
            .estimate(Decimal::from(1_000_000_u64), Decimal::from(1_000_000_u64))
            .build();

        let outcome = harness.registrar.upload(upload_request(true)).await.expect("estimate");

        let RegistrationOutcome::Quote(quote) = outcome else {
            panic!("expected quote");
        };
        // 0.004 record quote + 2.5 archive + 0.001 send allowance
        assert_eq!(quote.total, Decimal::from_str("2.505").expect("decimal"));
        assert!(harness.signer.signed().is_empty());
    }

    #[tokio::test]
    async fn missing_price_is_rejected_before_paying() {
        let harness = TestHarness::builder()
            .archive(FakeArchive::new("QmHash"))
            .build();

        let err = harness.registrar.upload(upload_request(false)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::ArchivePriceUnavailable));
        assert!(harness.signer.signed().is_empty());
    }

    #[tokio::test]
    async fn oversized_price_is_rejected_before_paying() {
        let archive = FakeArchive::new("QmHash").with_estimate(ArchiveEstimate {
            key: "key-1".to_string(),
            price: Some(Decimal::from_str("100000000000000000000").expect("decimal")),
            ..ArchiveEstimate::default()
        });
        let harness = TestHarness::builder().archive(archive).build();

        let err = harness.registrar.upload(upload_request(false)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::ArchivePriceUnavailable));
        assert!(harness.signer.signed().is_empty());
        assert!(harness.archive().expect("archive").uploaded_with().is_empty());
        assert!(harness.publisher.log_types().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_after_payment_reports_tx_hash() {
        let archive = priced_archive();
        archive.fail_uploads(true);
        let harness = TestHarness::builder().archive(archive).build();

        let err = harness.registrar.upload(upload_request(false)).await.unwrap_err();

        let WorkflowError::UploadAfterPayment { tx_hash, .. } = err else {
            panic!("expected upload-after-payment error, got {err:?}");
        };
        assert_eq!(tx_hash, harness.ledger_hash(10));
    }

    #[tokio::test]
    async fn invalid_metadata_is_rejected_before_any_archive_call() {
        let harness = TestHarness::builder().archive(priced_archive()).build();
        let mut request = upload_request(false);
        request.registration.metadata = json!({ "keywords": "a,b" });

        let err = harness.registrar.upload(request).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(harness.archive().expect("archive").calls(), 0);
    }

    #[tokio::test]
    async fn upload_without_archive_service_is_refused() {
        let harness = TestHarness::builder().build();

        let err = harness.registrar.upload(upload_request(false)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::ArchiveNotConfigured));
    }
}
