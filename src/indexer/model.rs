// Wire shapes for the indexer HTTP API. Field names mirror the documented
// JSON shape (id, hash, level, timestamp, sender.address, target.address,
// amount, parameter.entrypoint, parameter.value, status) — nested address
// objects are unwrapped into flat fields via `into_raw` conversions before
// handing rows to downstream processors.

use crate::store::raw::{RawBalance, RawTokenTransfer, RawTransaction, RawXtzTransfer};
use serde::Deserialize;

fn addr(opt: &Option<AddressRef>) -> Option<String> {
    opt.as_ref().map(|a| a.address.clone())
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddressRef {
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Parameter {
    pub entrypoint: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireTransaction {
    pub id: i64,
    pub hash: String,
    pub level: i64,
    pub timestamp: String,
    pub sender: AddressRef,
    pub target: Option<AddressRef>,
    pub amount: i64,
    pub parameter: Option<Parameter>,
    pub status: String,
    #[serde(default)]
    pub has_internals: bool,
}

impl WireTransaction {
    pub fn into_raw(self) -> RawTransaction {
        let (entrypoint, parameters) = match self.parameter {
            Some(p) => (p.entrypoint, p.value.map(|v| v.to_string())),
            None => (None, None),
        };
        RawTransaction {
            id: self.id,
            hash: self.hash,
            level: self.level,
            timestamp: self.timestamp,
            sender: self.sender.address,
            target: self.target.as_ref().map(|a| a.address.clone()),
            amount: self.amount,
            entrypoint,
            parameters,
            status: self.status,
            has_internals: self.has_internals,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenRef {
    pub contract: AddressRef,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(default)]
    pub standard: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireTokenTransfer {
    pub id: i64,
    pub level: i64,
    pub timestamp: String,
    pub token: TokenRef,
    pub from: Option<AddressRef>,
    pub to: Option<AddressRef>,
    pub amount: String,
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<i64>,
}

impl WireTokenTransfer {
    pub fn into_raw(self) -> RawTokenTransfer {
        RawTokenTransfer {
            id: self.id,
            level: self.level,
            timestamp: self.timestamp,
            token_contract: self.token.contract.address,
            token_id: self.token.token_id,
            token_standard: self.token.standard.unwrap_or_else(|| "fa2".to_string()),
            from_address: addr(&self.from),
            to_address: addr(&self.to),
            amount: self.amount,
            transaction_id: self.transaction_id,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireBalanceSnapshot {
    pub balance: Option<i64>,
    pub timestamp: String,
}

impl WireBalanceSnapshot {
    pub fn into_raw(self, address: &str) -> RawBalance {
        RawBalance {
            address: address.to_string(),
            balance: self.balance,
            snapshot_ts: self.timestamp,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireValueTransfer {
    pub id: i64,
    pub hash: String,
    pub timestamp: String,
    pub sender: AddressRef,
    pub target: AddressRef,
    pub amount: i64,
}

impl WireValueTransfer {
    pub fn into_raw(self, is_from_cex: bool, is_to_cex: bool) -> RawXtzTransfer {
        RawXtzTransfer {
            id: self.id,
            hash: self.hash,
            timestamp: self.timestamp,
            sender: self.sender.address,
            target: self.target.address,
            amount: self.amount,
            is_from_cex,
            is_to_cex,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContractMetadataResponse {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenMetadataResponse {
    pub decimals: Option<i64>,
    #[serde(rename = "artifactUri")]
    pub artifact_uri: Option<String>,
    #[serde(rename = "displayUri")]
    pub display_uri: Option<String>,
    #[serde(rename = "thumbnailUri")]
    pub thumbnail_uri: Option<String>,
    pub supply: Option<String>,
}
