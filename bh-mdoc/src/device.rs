// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! This module provides the [`Device`] type: the holder side of an `mso_mdoc` presentation.

use crate::{
    models::{
        data_retrieval::{
            common::RequestedElements,
            response::{DeviceNameSpaces, DeviceSigned, Document},
        },
        DeviceResponse, DocType, IssuerSigned, SessionBinding,
    },
    Result,
};

/// The holder's device, presenting held `mso_mdoc` Credentials.
pub struct Device;

impl Device {
    /// Build a [`DeviceResponse`] presenting the requested subset of the held credential.
    ///
    /// Selective disclosure simply filters the issuer-signed items to the requested elements;
    /// the non-presented digests in the MSO stay authenticated but reveal nothing.  The device
    /// signature binds the response to the verifier's session per the provided
    /// [`SessionBinding`].
    ///
    /// The credential must not be expired; unlike a verifier, the device does present
    /// not-yet-valid credentials.
    pub fn present<S: bh_jose::Signer>(
        &self,
        issuer_signed: IssuerSigned,
        doc_type: DocType,
        requested: &RequestedElements,
        session: &SessionBinding<'_>,
        device_signer: &S,
        current_time: u64,
    ) -> Result<DeviceResponse> {
        issuer_signed.validate_device(current_time, &doc_type)?;

        let disclosed = issuer_signed.filtered_claims(requested);

        let device_signed =
            DeviceSigned::new(DeviceNameSpaces::default(), session, &doc_type, device_signer)?;

        let document = Document::new(doc_type, disclosed, device_signed);

        Ok(DeviceResponse::new(vec![document]))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::Es256Verifier;
    use rand::thread_rng;

    use super::*;
    use crate::{
        models::{data_retrieval::issuer_auth::ValidityInfo, Claims},
        utils::test::{
            dummy_device_key, issuer_signer, DummySession, DUMMY_DOC_TYPE, DUMMY_NAMESPACE,
        },
        Issuer, MdocError,
    };

    fn issue(now: u64) -> (IssuerSigned, bh_jose::Es256Signer) {
        let (device_signer, device_key) = dummy_device_key();

        let mut claims = Claims::default();
        claims.insert(DUMMY_NAMESPACE, "family_name", "Doe");
        claims.insert(DUMMY_NAMESPACE, "given_name", "John");

        let issuer_signed = Issuer
            .issue(
                DUMMY_DOC_TYPE.into(),
                claims,
                device_key,
                ValidityInfo::new(now, now, now + 1000).unwrap(),
                None,
                &issuer_signer(),
                &mut thread_rng(),
            )
            .unwrap();

        (issuer_signed, device_signer)
    }

    fn session() -> DummySession {
        DummySession {
            client_id: "https://verifier.example/rp2".to_owned(),
            response_uri: "https://verifier.example/cb".to_owned(),
            nonce: "n3".to_owned(),
            mdoc_generated_nonce: Some("mgn3".to_owned()),
        }
    }

    #[test]
    fn presented_subset_carries_only_requested_elements() {
        let now = 1000;
        let (issuer_signed, device_signer) = issue(now);

        let mut requested = RequestedElements::default();
        requested.add(DUMMY_NAMESPACE, "family_name");

        let response = Device
            .present(
                issuer_signed,
                DUMMY_DOC_TYPE.into(),
                &requested,
                &session().as_binding(),
                &device_signer,
                now,
            )
            .unwrap();

        let document = response.into_documents().unwrap().remove(0);
        document
            .verify(&session().as_binding(), None, |_| Some(&Es256Verifier))
            .unwrap();

        let claims = document.into_claims();
        assert!(claims
            .get(&DUMMY_NAMESPACE.into(), &"family_name".into())
            .is_some());
        assert!(claims
            .get(&DUMMY_NAMESPACE.into(), &"given_name".into())
            .is_none());
    }

    #[test]
    fn expired_credential_is_not_presented() {
        let now = 1000;
        let (issuer_signed, device_signer) = issue(now);

        let err = Device
            .present(
                issuer_signed,
                DUMMY_DOC_TYPE.into(),
                &RequestedElements::default(),
                &session().as_binding(),
                &device_signer,
                now + 2000,
            )
            .unwrap_err();

        assert_matches!(err.error, MdocError::DocumentExpired(_));
    }

    #[test]
    fn not_yet_valid_credential_is_presented() {
        let now = 1000;
        let (issuer_signed, device_signer) = issue(now);

        // the device presents a credential that only becomes valid in the future
        Device
            .present(
                issuer_signed,
                DUMMY_DOC_TYPE.into(),
                &RequestedElements::default(),
                &session().as_binding(),
                &device_signer,
                now - 500,
            )
            .unwrap();
    }
}
