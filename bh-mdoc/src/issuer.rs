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

//! This module provides the [`Issuer`] type for issuing `mso_mdoc` Credentials.

use bh_status_list::StatusClaim;
use rand::Rng;

use crate::{
    models::{
        data_retrieval::{
            issuer_auth::{IssuerAuth, ValidityInfo},
            response::{IssuerNameSpaces, IssuerSigned, IssuerSignedItem},
        },
        Bytes, Claims, DocType,
    },
    DeviceKey, Result,
};

/// Issuer of `mso_mdoc` Credentials.
pub struct Issuer;

impl Issuer {
    /// Issue a credential over the provided cleartext claims, bound to `device_key`.
    ///
    /// Every data element becomes an `IssuerSignedItem` with a fresh 16-byte `random` and a
    /// `digestID` monotonically allocated within its namespace; the digests of the tag-24
    /// item bytes are committed in the signed `MobileSecurityObject`.
    pub fn issue<S: bh_jose::Signer + bh_jose::HasX5Chain, R: Rng + ?Sized>(
        &self,
        doc_type: DocType,
        claims: Claims,
        device_key: DeviceKey,
        validity_info: ValidityInfo,
        status: Option<StatusClaim>,
        signer: &S,
        rng: &mut R,
    ) -> Result<IssuerSigned> {
        let name_spaces = IssuerNameSpaces(
            claims
                .0
                .into_iter()
                .map(|(name_space, elements)| {
                    let items = elements
                        .into_iter()
                        .enumerate()
                        .map(|(digest_id, (element_identifier, element_value))| {
                            IssuerSignedItem {
                                random: Bytes::random_salt(rng),
                                digest_id: digest_id.into(),
                                element_value,
                                element_identifier,
                            }
                            .into()
                        })
                        .collect();

                    (name_space, items)
                })
                .collect(),
        );

        let issuer_auth = IssuerAuth::new(
            doc_type,
            &name_spaces,
            device_key,
            validity_info,
            status,
            signer,
        )?;

        Ok(IssuerSigned::new(name_spaces, issuer_auth))
    }
}
