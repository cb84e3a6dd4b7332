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

//! The Issuer agent: one credential subject, three interoperable representations.

use bh_jose::{Es256Signer, JwkPublic, SignerWithChain};
use bh_mdoc::models::{data_retrieval::issuer_auth::ValidityInfo, Claims as MdocClaims, DocType, IssuerSigned};
use bh_sd_jwt::{JsonNodePathSegment, Sha256};
use bh_status_list::{CredentialStatus, RevocationList, StatusClaim};
use bh_vc_jwt::VcJwtClaims;
use bherror::traits::PropagateError as _;
use iref::UriBuf;

use crate::{error::OpenId4VpError, JsonObject, Result, SecondsSinceEpoch};

/// A credential issued in one of the three representations.
#[derive(Debug)]
pub enum IssuedCredential {
    /// A compact W3C VC-JWT.
    VcJwt(String),

    /// An SD-JWT in its compact serialization (`<JWT>~<D1>~…~`).
    SdJwt(String),

    /// An ISO mdoc issuer-signed structure.
    Mdoc {
        /// The issuer-signed structure.
        issuer_signed: Box<IssuerSigned>,
        /// Its document type.
        doc_type: DocType,
    },
}

/// The Issuer agent.
///
/// Owns the issuing key material; each `issue_*` method produces one representation of a
/// credential subject.
pub struct Issuer {
    id: UriBuf,
    signer: SignerWithChain<Es256Signer>,
}

impl Issuer {
    /// An issuer identified by `id`, signing with the given key material.
    pub fn new(id: UriBuf, signer: SignerWithChain<Es256Signer>) -> Self {
        Self { id, signer }
    }

    /// The issuer identifier.
    pub fn id(&self) -> &UriBuf {
        &self.id
    }

    /// The issuer's key material.
    pub fn signer(&self) -> &SignerWithChain<Es256Signer> {
        &self.signer
    }

    /// Issue a W3C VC-JWT over `claims`, bound to the holder identified by `subject_id`.
    pub fn issue_vc_jwt(
        &self,
        credential_type: &str,
        subject_id: &str,
        claims: JsonObject,
        issuance_date: SecondsSinceEpoch,
        expiration_date: Option<SecondsSinceEpoch>,
        credential_status: Option<CredentialStatus>,
    ) -> Result<IssuedCredential> {
        let payload = VcJwtClaims::new(
            format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            credential_type.to_owned(),
            &self.id,
            subject_id.to_owned(),
            claims,
            issuance_date,
            expiration_date,
            credential_status,
        );

        let compact = payload
            .sign(&self.signer)
            .with_err(|| OpenId4VpError::CryptoFailed)?;

        Ok(IssuedCredential::VcJwt(compact))
    }

    /// Issue an SD-JWT VC over `claims`, with the top-level claims named in `disclosable`
    /// selectively disclosable, bound to the holder key `holder_jwk`.
    pub fn issue_sd_jwt<R: rand::Rng + rand::CryptoRng>(
        &self,
        vct: &str,
        holder_jwk: JwkPublic,
        claims: JsonObject,
        disclosable: &[&str],
        rng: &mut R,
    ) -> Result<IssuedCredential> {
        let jwt = bh_sd_jwt::IssuerJwt::new(vct.to_owned(), self.id.clone(), holder_jwk, claims)
            .with_err(|| OpenId4VpError::InvalidStructure("invalid SD-JWT claims".to_owned()))?;

        let paths: Vec<[JsonNodePathSegment; 1]> = disclosable
            .iter()
            .map(|&name| [JsonNodePathSegment::Key(name)])
            .collect();
        let paths: Vec<&bh_sd_jwt::JsonNodePath> =
            paths.iter().map(|path| path.as_slice()).collect();

        let issued = bh_sd_jwt::Issuer::new(Sha256)
            .issue(jwt, &paths, &self.signer, rng)
            .with_err(|| OpenId4VpError::CryptoFailed)?;

        Ok(IssuedCredential::SdJwt(issued.into_string_compact()))
    }

    /// Issue an ISO mdoc over `claims`, bound to the holder's device key.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_mdoc<R: rand::Rng + ?Sized>(
        &self,
        doc_type: &str,
        claims: MdocClaims,
        device_key_jwk: &JwkPublic,
        signed_at: SecondsSinceEpoch,
        valid_for: SecondsSinceEpoch,
        status: Option<StatusClaim>,
        rng: &mut R,
    ) -> Result<IssuedCredential> {
        let device_key = bh_mdoc::DeviceKey::from_jwk(device_key_jwk)
            .with_err(|| OpenId4VpError::InvalidStructure("invalid device key".to_owned()))?;

        let validity = ValidityInfo::new(signed_at, signed_at, signed_at + valid_for)
            .with_err(|| OpenId4VpError::InvalidStructure("invalid validity window".to_owned()))?;

        let doc_type: DocType = doc_type.into();

        let issuer_signed = bh_mdoc::Issuer
            .issue(
                doc_type.clone(),
                claims,
                device_key,
                validity,
                status,
                &self.signer,
                rng,
            )
            .with_err(|| OpenId4VpError::CryptoFailed)?;

        Ok(IssuedCredential::Mdoc {
            issuer_signed: Box::new(issuer_signed),
            doc_type,
        })
    }

    /// Issue the revocation-list credential published at `list_url`.
    pub fn issue_revocation_list(
        &self,
        list_url: &UriBuf,
        list: &RevocationList,
        issued_at: SecondsSinceEpoch,
    ) -> Result<String> {
        bh_vc_jwt::revocation::issue_revocation_list_credential(
            list_url,
            &self.id,
            list,
            issued_at,
            &self.signer,
        )
        .with_err(|| OpenId4VpError::CryptoFailed)
    }

    /// A pointer into the revocation list at `list_url` for a newly allocated `index`.
    pub fn credential_status(&self, list_url: &UriBuf, index: u64) -> CredentialStatus {
        CredentialStatus::new(list_url.clone(), index)
    }
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_issuer() -> Issuer {
        let signer =
            SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap();
        Issuer::new(
            UriBuf::new(b"https://issuer.example".to_vec()).unwrap(),
            signer,
        )
    }

    #[test]
    fn issues_all_three_representations() {
        let issuer = dummy_issuer();
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let mut claims = JsonObject::new();
        claims.insert("given-name".to_owned(), "Erika".into());

        let vc = issuer
            .issue_vc_jwt("AtomicAttribute2023", "did:key:holder", claims.clone(), 1000, None, None)
            .unwrap();
        assert!(matches!(vc, IssuedCredential::VcJwt(_)));

        let sd = issuer
            .issue_sd_jwt(
                "AtomicAttribute2023",
                holder_jwk.clone(),
                claims,
                &["given-name"],
                &mut rand::thread_rng(),
            )
            .unwrap();
        let IssuedCredential::SdJwt(compact) = &sd else {
            panic!("expected an SD-JWT");
        };
        assert!(compact.ends_with('~'));

        let mut mdoc_claims = MdocClaims::default();
        mdoc_claims.insert("org.iso.18013.5.1", "given_name", "Erika");

        let mdoc = issuer
            .issue_mdoc(
                "org.iso.18013.5.1.mDL",
                mdoc_claims,
                &holder_jwk,
                1000,
                1000,
                None,
                &mut rand::thread_rng(),
            )
            .unwrap();
        assert!(matches!(mdoc, IssuedCredential::Mdoc { .. }));
    }
}
