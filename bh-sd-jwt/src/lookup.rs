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

//! Resolution of the SD-JWT issuer's public key.
//!
//! Which mechanism applies depends on the deployment: a closed ecosystem knows its issuers'
//! keys up front ([`StaticKeyLookup`]), while an open one resolves the `x5c` header chain
//! against a set of trust anchors ([`X5ChainLookup`]).  Resolution is `async` because
//! real-world implementations may need to fetch metadata over the network.

use std::{collections::HashMap, future::Future};

use bh_jose::{public_jwk_from_x5chain_leaf, JwkPublic};
use bh_x509::{X509Trust, X5Chain};
use bherror::{
    traits::{ErrorContext as _, PropagateError as _},
    Error,
};

use crate::{error::SignatureError, IssuerJwtHeader};

/// Resolves the issuer's public key based on the `iss` claim and the JWT header.
pub trait IssuerPublicKeyLookup {
    /// Return the public JWK to verify the issuer's signature with.
    fn lookup(
        &self,
        iss: &str,
        header: &IssuerJwtHeader,
    ) -> impl Future<Output = crate::Result<JwkPublic, SignatureError>>;
}

/// Key lookup for closed ecosystems: a fixed `iss` → JWK table.
#[derive(Debug, Default)]
pub struct StaticKeyLookup(pub HashMap<String, JwkPublic>);

impl IssuerPublicKeyLookup for StaticKeyLookup {
    async fn lookup(
        &self,
        iss: &str,
        _header: &IssuerJwtHeader,
    ) -> crate::Result<JwkPublic, SignatureError> {
        self.0
            .get(iss)
            .cloned()
            .ok_or_else(|| Error::root(SignatureError::PublicKeyLookupFailed))
            .ctx(|| format!("unknown issuer `{iss}`"))
    }
}

/// Key lookup through the `x5c` JWT header parameter.
///
/// When constructed with trust anchors, the presented chain must verify against them; without
/// anchors the leaf key is extracted without authentication (useful for tests and for
/// deployments which authenticate issuers elsewhere).
#[derive(Debug, Default)]
pub struct X5ChainLookup {
    trust: Option<X509Trust>,
}

impl X5ChainLookup {
    /// Lookup verifying the header chain against the provided trust anchors.
    pub fn new(trust: X509Trust) -> Self {
        Self { trust: Some(trust) }
    }

    /// Lookup accepting any syntactically valid header chain.
    pub fn unauthenticated() -> Self {
        Self { trust: None }
    }
}

impl IssuerPublicKeyLookup for X5ChainLookup {
    async fn lookup(
        &self,
        _iss: &str,
        header: &IssuerJwtHeader,
    ) -> crate::Result<JwkPublic, SignatureError> {
        let x5c = header
            .x5c
            .clone()
            .ok_or_else(|| Error::root(SignatureError::PublicKeyLookupFailed))
            .ctx(|| "no `x5c` in the JWT header")?;

        let chain: X5Chain = x5c
            .try_into()
            .with_err(|| SignatureError::PublicKeyLookupFailed)
            .ctx(|| "unparseable `x5c` chain")?;

        if let Some(trust) = &self.trust {
            trust
                .verify(&chain)
                .with_err(|| SignatureError::PublicKeyLookupFailed)
                .ctx(|| "issuer certificate chain not trusted")?;
        }

        public_jwk_from_x5chain_leaf(&chain, &header.alg, None)
            .with_err(|| SignatureError::PublicKeyLookupFailed)
            .ctx(|| "no usable key in the `x5c` leaf")
    }
}

#[cfg(test)]
mod tests {
    use bh_jose::{HasX5Chain as _, Signer as _};

    use super::*;
    use crate::issuer::tests::dummy_signer;

    fn dummy_header(x5c: Option<bh_x509::JwtX5Chain>) -> IssuerJwtHeader {
        IssuerJwtHeader {
            typ: crate::issuer::TYP_VC_SD_JWT.to_owned(),
            alg: bh_jose::SigningAlgorithm::Es256,
            kid: None,
            x5c,
        }
    }

    #[tokio::test]
    async fn static_lookup_resolves_known_issuer() {
        let signer = dummy_signer();
        let jwk = signer.public_jwk().unwrap();

        let lookup = StaticKeyLookup(
            [("https://issuer.example".to_owned(), jwk.clone())]
                .into_iter()
                .collect(),
        );

        let resolved = lookup
            .lookup("https://issuer.example", &dummy_header(None))
            .await
            .unwrap();
        assert_eq!(resolved, jwk);

        let err = lookup
            .lookup("https://other.example", &dummy_header(None))
            .await
            .unwrap_err();
        assert_eq!(err.error, SignatureError::PublicKeyLookupFailed);
    }

    #[tokio::test]
    async fn x5chain_lookup_extracts_leaf_key() {
        let signer = dummy_signer();
        let x5c = signer.x5chain().try_into().unwrap();

        let lookup = X5ChainLookup::unauthenticated();
        let resolved = lookup
            .lookup("https://issuer.example", &dummy_header(Some(x5c)))
            .await
            .unwrap();

        // leaf key must equal the signer's public key (modulo metadata members)
        let expected = signer.public_jwk().unwrap();
        assert_eq!(resolved.get("x"), expected.get("x"));
        assert_eq!(resolved.get("y"), expected.get("y"));
    }

    #[tokio::test]
    async fn x5chain_lookup_enforces_trust() {
        let signer = dummy_signer();
        let x5c: bh_x509::JwtX5Chain = signer.x5chain().try_into().unwrap();

        // empty trust set rejects everything
        let lookup = X5ChainLookup::new(X509Trust::new(vec![]));
        let err = lookup
            .lookup("https://issuer.example", &dummy_header(Some(x5c.clone())))
            .await
            .unwrap_err();
        assert_eq!(err.error, SignatureError::PublicKeyLookupFailed);

        // trusting the self-signed leaf passes
        let trusted = X5ChainLookup::new(X509Trust::new(vec![signer
            .x5chain()
            .leaf_certificate()
            .clone()]));
        trusted
            .lookup("https://issuer.example", &dummy_header(Some(x5c)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn x5chain_lookup_requires_header_chain() {
        let lookup = X5ChainLookup::unauthenticated();
        let err = lookup
            .lookup("https://issuer.example", &dummy_header(None))
            .await
            .unwrap_err();
        assert_eq!(err.error, SignatureError::PublicKeyLookupFailed);
    }
}
