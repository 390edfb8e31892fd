// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dashboard actions: send, faucet drop, export and logout.
//!
//! Transaction signing and wallet export are always stamped with the
//! passkey, never with a stored credential bundle.

use tracing::{info, warn};

use crate::api::TransactionHash;
use crate::config::BUNDLE_STORAGE_KEY;
use crate::error::ClientError;
use crate::frame::IframeStamper;
use crate::session::AuthState;
use crate::stamper::Stamper;
use crate::state::ClientState;

/// Send `amount` (decimal string, e.g. `"0.01"`) to `destination`.
pub async fn send(
    state: &ClientState,
    amount: &str,
    destination: &str,
) -> Result<TransactionHash, ClientError> {
    let constructed = state.api().construct_tx(amount, destination).await?;

    let stamper = Stamper::WebAuthn(state.webauthn_stamper());
    let signed = state
        .custody
        .stamp_sign_transaction(
            &stamper,
            &constructed.organization_id,
            &constructed.address,
            &constructed.unsigned_transaction,
        )
        .await?;

    Ok(state.api().send_tx(&signed, destination).await?)
}

pub async fn request_drop(state: &ClientState) -> Result<TransactionHash, ClientError> {
    Ok(state.api().request_drop().await?)
}

/// Export the wallet mnemonic into `frame`.
///
/// The export is encrypted to the frame's public key and decrypted inside
/// it; the caller only learns whether the reveal happened.
pub async fn export_wallet(state: &ClientState, frame: &IframeStamper) -> Result<(), ClientError> {
    let organization_id = match state.session.state().sub_organization_id {
        Some(id) => id,
        None => state
            .session
            .refresh()
            .await
            .sub_organization_id
            .ok_or_else(|| ClientError::precondition("log in before exporting the wallet"))?,
    };
    let wallet = state.api().wallet().await?;
    let target_public_key = frame.init().await?;

    let stamper = Stamper::WebAuthn(state.webauthn_stamper());
    let signed = state
        .custody
        .stamp_export_wallet(
            &stamper,
            &organization_id,
            &wallet.turnkey_uuid,
            &target_public_key,
        )
        .await?;

    let bundle = state.api().export_wallet(&signed).await?;
    frame.inject_wallet_export_bundle(&bundle).await?;
    info!(wallet_id = %wallet.turnkey_uuid, "Wallet exported");
    Ok(())
}

/// Drop the stored bundle, tear down `frame` and end the backend session.
pub async fn logout(
    state: &ClientState,
    frame: Option<&IframeStamper>,
) -> Result<AuthState, ClientError> {
    if let Err(e) = state.bundles.remove(BUNDLE_STORAGE_KEY) {
        warn!(error = %e, "Failed to remove credential bundle");
    }
    if let Some(frame) = frame {
        frame.clear();
    }

    state.api().logout().await?;
    Ok(state.session.refresh().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::*;
    use crate::flows::{register_or_authenticate, AuthOutcome};
    use crate::frame::BridgeState;
    use crate::stamper::WEBAUTHN_STAMP_HEADER;
    use serde_json::Value;
    use std::time::Duration;

    async fn signed_up(h: &Harness) {
        let outcome = register_or_authenticate(&h.state, "new@example.com")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Registered { .. }));
    }

    #[tokio::test]
    async fn send_signs_constructed_transaction_with_passkey() {
        let h = harness().await;
        signed_up(&h).await;

        let hash = send(&h.state, "0.01", "0xdest").await.unwrap();
        assert_eq!(hash.hash, "0xfeed");

        let constructed = h.backend.body("construct-tx");
        assert_eq!(constructed["amount"], "0.01");
        assert_eq!(constructed["destination"], "0xdest");

        let sent = h.backend.body("send-tx");
        assert_eq!(sent["destination"], "0xdest");
        let signed = &sent["signedSendTx"];
        assert_eq!(signed["stamp"]["stampHeaderName"], WEBAUTHN_STAMP_HEADER);
        let activity: Value = serde_json::from_str(signed["body"].as_str().unwrap()).unwrap();
        assert_eq!(activity["type"], "ACTIVITY_TYPE_SIGN_TRANSACTION_V2");
        assert_eq!(activity["organizationId"], SUB_ORG);
        assert_eq!(activity["parameters"]["signWith"], "0xabc");
        assert_eq!(activity["parameters"]["unsignedTransaction"], "02f0");
    }

    #[tokio::test]
    async fn drop_returns_hash() {
        let h = harness().await;
        assert_eq!(request_drop(&h.state).await.unwrap().hash, "0xd00d");
    }

    #[tokio::test]
    async fn export_reveals_inside_frame() {
        let h = harness().await;
        signed_up(&h).await;

        let frame = h.state.export_frame();
        export_wallet(&h.state, &frame).await.unwrap();

        assert_eq!(
            *h.revealed.0.lock().unwrap(),
            vec!["test test test junk".to_string()]
        );
        let signed = &h.backend.body("export")["signedExportRequest"];
        let activity: Value = serde_json::from_str(signed["body"].as_str().unwrap()).unwrap();
        assert_eq!(activity["type"], "ACTIVITY_TYPE_EXPORT_WALLET");
        assert_eq!(activity["organizationId"], SUB_ORG);
        assert_eq!(activity["parameters"]["walletId"], "wallet-uuid");
        assert_eq!(
            activity["parameters"]["targetPublicKey"],
            frame.public_key().unwrap()
        );
    }

    #[tokio::test]
    async fn export_requires_session() {
        let h = harness().await;
        let err = export_wallet(&h.state, &h.state.export_frame())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Precondition(_)));
        assert!(!h.backend.calls().contains(&"export".to_string()));
    }

    #[tokio::test]
    async fn logout_clears_bundle_frame_and_session() {
        let h = harness().await;
        signed_up(&h).await;
        h.state
            .bundles
            .set(BUNDLE_STORAGE_KEY, "bundle", Duration::from_secs(3600))
            .unwrap();
        let frame = h.state.auth_frame();
        frame.init().await.unwrap();

        let state = logout(&h.state, Some(&frame)).await.unwrap();
        assert!(state.is_loaded && !state.is_logged_in);
        assert!(h.state.bundles.get(BUNDLE_STORAGE_KEY).unwrap().is_none());
        assert_eq!(frame.state(), BridgeState::Cleared);
        assert!(h.backend.calls().contains(&"logout".to_string()));
    }
}
