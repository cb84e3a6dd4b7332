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

//! The Status List Token: a signed JWT conveying a [`StatusList`].

use bh_jose::{jwt, JwkPublic, JwtSigner, JwtVerifier as _, SignatureVerifier, SigningAlgorithm};
use bherror::{
    traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _},
    Error,
};
use iref::Uri;
use serde::{Deserialize, Serialize};

use crate::{Result, StatusList, UriBuf};

/// The required `typ` header value of a Status List Token, as specified in [the draft][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#name-status-list-token-in-jwt-fo
pub const STATUS_LIST_TOKEN_TYP: &str = "statuslist+jwt";

/// Header of a Status List Token.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusListTokenHeader {
    /// Always [`STATUS_LIST_TOKEN_TYP`].
    pub typ: String,

    /// Algorithm used to sign the token.
    pub alg: SigningAlgorithm,

    /// Identifier of the signing key.
    pub kid: String,
}

impl jwt::JoseHeader for StatusListTokenHeader {
    fn algorithm_type(&self) -> jwt::AlgorithmType {
        self.alg.into()
    }
}

/// Claims of a Status List Token, as specified in [the draft][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#name-status-list-token-in-jwt-fo
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusListTokenClaims {
    /// The issuer of the token, which **MUST** equal the issuer of the referenced credentials.
    pub iss: UriBuf,

    /// The URI the Status List Token is fetched from.
    pub sub: UriBuf,

    /// The time of issuance.
    pub iat: u64,

    /// Optional hard expiry of this token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Optional maximum time, in seconds, the token may be cached after `iat`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// The conveyed Status List.
    pub status_list: StatusList,
}

impl StatusListTokenClaims {
    /// Assemble the claims of a new Status List Token.
    pub fn new(
        iss: UriBuf,
        sub: UriBuf,
        iat: u64,
        exp: Option<u64>,
        ttl: Option<u64>,
        status_list: StatusList,
    ) -> Self {
        Self {
            iss,
            sub,
            iat,
            exp,
            ttl,
            status_list,
        }
    }

    /// Verify the claims against the expected issuer, the URI the token was fetched from, and
    /// the current time.
    fn verify(&self, current_time: u64, iss: &Uri, sub: &Uri) -> Result<()> {
        if &*self.iss != iss {
            return Err(Error::root(crate::Error::InvalidIssuer(
                self.iss.to_string(),
            )));
        }

        if &*self.sub != sub {
            return Err(Error::root(crate::Error::InvalidSubject(
                self.sub.to_string(),
            )));
        }

        if self.iat > current_time {
            return Err(Error::root(crate::Error::TokenIssuedInTheFuture(
                self.iat,
                current_time,
            )));
        }

        if let Some(exp) = self.exp {
            if current_time >= exp {
                return Err(Error::root(crate::Error::TokenStale(current_time)));
            }
        }

        if let Some(ttl) = self.ttl {
            if current_time > self.iat + ttl {
                return Err(Error::root(crate::Error::TokenStale(current_time)));
            }
        }

        Ok(())
    }
}

/// A Status List Token in the JWT format.
///
/// The `Status` type parameter tracks whether the token was produced by signing
/// ([`jwt::token::Signed`]) or by verification ([`jwt::token::Verified`]).
pub struct StatusListToken<Status = jwt::token::Signed>(
    jwt::Token<StatusListTokenHeader, StatusListTokenClaims, Status>,
);

impl<Status> std::fmt::Debug for StatusListToken<Status> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusListToken")
            .field("header", self.header())
            .field("claims", self.claims())
            .finish()
    }
}

impl<Status> StatusListToken<Status> {
    /// Returns the token header.
    pub fn header(&self) -> &StatusListTokenHeader {
        self.0.header()
    }

    /// Returns the token claims.
    pub fn claims(&self) -> &StatusListTokenClaims {
        self.0.claims()
    }
}

impl<Status> From<StatusListToken<Status>> for (StatusListTokenHeader, StatusListTokenClaims) {
    fn from(token: StatusListToken<Status>) -> Self {
        token.0.into()
    }
}

impl StatusListToken {
    /// Sign a new Status List Token with the provided key.
    pub fn new(claims: StatusListTokenClaims, kid: String, key: &impl JwtSigner) -> Result<Self> {
        let header = StatusListTokenHeader {
            typ: STATUS_LIST_TOKEN_TYP.to_owned(),
            alg: key.algorithm(),
            kid,
        };

        let signed_token = key
            .sign_jwt(jwt::Token::new(header, claims))
            .foreign_boxed_err(|| crate::Error::SigningFailed)?;

        Ok(Self(signed_token))
    }

    /// The compact JWT serialization of the token.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl StatusListToken<jwt::token::Verified> {
    /// Parse & verify a Status List Token.
    ///
    /// The verification covers the signature (against `public_key` with `verifier`), the `typ`
    /// header, the issuer & subject bindings, and the `iat`/`exp`/`ttl` freshness rules.
    pub fn verify(
        token: &str,
        verifier: &(dyn SignatureVerifier + Sync),
        public_key: &JwkPublic,
        current_time: u64,
        iss: &Uri,
        sub: &Uri,
    ) -> Result<Self> {
        let token_unverified: jwt::Token<StatusListTokenHeader, StatusListTokenClaims, _> =
            jwt::Token::parse_unverified(token)
                .foreign_err(|| crate::Error::InvalidToken)
                .ctx(|| "not a parsable JWT")?;

        let token_verified = verifier
            .verify_jwt_signature(token_unverified, public_key)
            .foreign_boxed_err(|| crate::Error::InvalidToken)
            .ctx(|| "signature verification failed")?;

        let verified = Self(token_verified);

        if verified.header().typ != STATUS_LIST_TOKEN_TYP {
            return Err(Error::root(crate::Error::InvalidTokenHeaderTyp(
                verified.header().typ.clone(),
            )));
        }

        verified.claims().verify(current_time, iss, sub)?;

        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use bh_jose::Es256Signer;

    use super::*;
    use crate::{StatusBits, StatusListInternal};

    fn iss_uri() -> UriBuf {
        UriBuf::new(b"https://issuer.example".to_vec()).unwrap()
    }

    fn sub_uri() -> UriBuf {
        UriBuf::new(b"https://issuer.example/status/1".to_vec()).unwrap()
    }

    fn dummy_status_list() -> StatusList {
        let mut list = StatusListInternal::new(StatusBits::Two, None);
        for status in [0u8, 1, 2, 3] {
            list.push(status).unwrap();
        }
        list.into()
    }

    fn signed_token(signer: &Es256Signer, iat: u64, exp: Option<u64>, ttl: Option<u64>) -> String {
        let claims =
            StatusListTokenClaims::new(iss_uri(), sub_uri(), iat, exp, ttl, dummy_status_list());
        StatusListToken::new(claims, "status-kid".to_owned(), signer)
            .unwrap()
            .as_str()
            .to_owned()
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let signer = Es256Signer::generate("status-kid".to_owned()).unwrap();
        let token = signed_token(&signer, 1000, None, None);

        let verified = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &signer.public_jwk().unwrap(),
            1500,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap();

        assert_eq!(verified.claims().status_list.get(3), Some(3));

        let (header, claims) = verified.into();
        assert_eq!(header.typ, STATUS_LIST_TOKEN_TYP);
        assert_eq!(claims.iat, 1000);
    }

    #[test]
    fn issuer_and_subject_must_match() {
        let signer = Es256Signer::generate("status-kid".to_owned()).unwrap();
        let token = signed_token(&signer, 1000, None, None);
        let jwk = signer.public_jwk().unwrap();

        let other = UriBuf::new(b"https://other.example".to_vec()).unwrap();

        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1500,
            &other,
            &sub_uri(),
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::InvalidIssuer(_)));

        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1500,
            &iss_uri(),
            &other,
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::InvalidSubject(_)));
    }

    #[test]
    fn freshness_rules_are_enforced() {
        let signer = Es256Signer::generate("status-kid".to_owned()).unwrap();
        let jwk = signer.public_jwk().unwrap();

        // `iat` in the future
        let token = signed_token(&signer, 2000, None, None);
        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1000,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::TokenIssuedInTheFuture(2000, 1000)));

        // expired
        let token = signed_token(&signer, 1000, Some(1500), None);
        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1500,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::TokenStale(1500)));

        // cached past its ttl
        let token = signed_token(&signer, 1000, None, Some(100));
        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1101,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::TokenStale(1101)));

        // exactly at `iat + ttl` is still fresh
        let token = signed_token(&signer, 1000, None, Some(100));
        StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &jwk,
            1100,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap();
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let signer = Es256Signer::generate("status-kid".to_owned()).unwrap();
        let other = Es256Signer::generate("other-kid".to_owned()).unwrap();
        let token = signed_token(&signer, 1000, None, None);

        let err = StatusListToken::verify(
            &token,
            &bh_jose::Es256Verifier,
            &other.public_jwk().unwrap(),
            1500,
            &iss_uri(),
            &sub_uri(),
        )
        .unwrap_err();
        assert!(matches!(err.error, crate::Error::InvalidToken));
    }
}
