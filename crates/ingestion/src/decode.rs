//! Decoding of Transfer logs, receipts, blocks and `balanceOf` results.

use crate::error::DecodeError;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function balanceOf(address account) external view returns (uint256);
}

/// Maximum extra data carried by a canonical block header.
const CANONICAL_EXTRA_DATA_LEN: usize = 32;

/// `keccak256("Transfer(address,address,uint256)")`
pub fn transfer_topic() -> B256 {
    Transfer::SIGNATURE_HASH
}

/// A log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<String>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

/// Fields of a `Transfer` log needed to build a transfer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
}

/// Receipt fields used for gas enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub gas_used: u64,
    /// Effective gas price when reported, else the legacy gas price, else 0.
    pub gas_price: u128,
    /// `None` for pre-Byzantium receipts that carry a state root instead.
    pub status: Option<u64>,
}

impl Receipt {
    pub fn gas_fee(&self) -> u128 {
        u128::from(self.gas_used).saturating_mul(self.gas_price)
    }
}

/// Block header fields used by the pollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub extra_data: Bytes,
    /// Signer seal split off the extra data on proof-of-authority chains.
    pub proof_of_authority_data: Option<Bytes>,
}

fn strip_hex(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Parse a hex JSON-RPC quantity.
pub fn parse_quantity(field: &'static str, value: &str) -> Result<u128, DecodeError> {
    u128::from_str_radix(strip_hex(value), 16).map_err(|_| DecodeError::InvalidQuantity {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    let quantity = parse_quantity(field, value)?;
    u64::try_from(quantity).map_err(|_| DecodeError::InvalidQuantity {
        field,
        value: value.to_string(),
    })
}

fn required_str<'a>(json: &'a Value, field: &'static str) -> Result<&'a str, DecodeError> {
    json[field].as_str().ok_or(DecodeError::MissingField(field))
}

/// Decode a `Transfer(address,address,uint256)` log.
///
/// `from` and `to` are the low 20 bytes of the two indexed topics; `value`
/// is the first 32-byte word of the data payload.
pub fn decode_transfer_log(log: &RawLog) -> Result<DecodedTransfer, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::MissingTopics {
            found: log.topics.len(),
        });
    }
    if log.data.len() < 32 {
        return Err(DecodeError::ShortData {
            found: log.data.len(),
        });
    }

    let tx_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingLogField("transactionHash"))?;
    let log_index = log
        .log_index
        .as_deref()
        .ok_or(DecodeError::MissingLogField("logIndex"))
        .and_then(|value| parse_u64("logIndex", value))?;
    let block_number = log
        .block_number
        .as_deref()
        .ok_or(DecodeError::MissingLogField("blockNumber"))
        .and_then(|value| parse_u64("blockNumber", value))?;

    Ok(DecodedTransfer {
        from: Address::from_word(log.topics[1]),
        to: Address::from_word(log.topics[2]),
        value: U256::from_be_slice(&log.data[..32]),
        tx_hash,
        log_index,
        block_number,
    })
}

/// Scale a raw token value down by `decimals`: `raw / 10^decimals`.
pub fn scale_amount(raw: U256, decimals: u8) -> Result<Decimal, DecodeError> {
    let overflow = || DecodeError::AmountOverflow {
        raw: raw.to_string(),
        decimals,
    };

    let raw = u128::try_from(raw).map_err(|_| overflow())?;
    let raw = i128::try_from(raw).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .map(|amount| amount.normalize())
        .map_err(|_| overflow())
}

/// Decode the fields of an `eth_getTransactionReceipt` result.
pub fn decode_receipt(json: &Value) -> Result<Receipt, DecodeError> {
    let gas_used = parse_u64("gasUsed", required_str(json, "gasUsed")?)?;

    let gas_price = match json["effectiveGasPrice"]
        .as_str()
        .or_else(|| json["gasPrice"].as_str())
    {
        Some(price) => parse_quantity("effectiveGasPrice", price)?,
        None => 0,
    };

    let status = json["status"]
        .as_str()
        .map(|status| parse_u64("status", status))
        .transpose()?;

    Ok(Receipt {
        gas_used,
        gas_price,
        status,
    })
}

/// Decode the header fields of an `eth_getBlockByNumber` result.
///
/// Canonical headers carry at most 32 bytes of extra data. Proof-of-authority
/// chains append the signer seal there; with `poa` set the surplus is moved to
/// `proof_of_authority_data`, without it such a header is rejected.
pub fn decode_block_header(json: &Value, poa: bool) -> Result<BlockHeader, DecodeError> {
    let number = parse_u64("number", required_str(json, "number")?)?;
    let timestamp_raw = required_str(json, "timestamp")?;
    let seconds = parse_u64("timestamp", timestamp_raw)?;
    let timestamp = i64::try_from(seconds)
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .ok_or_else(|| DecodeError::InvalidQuantity {
            field: "timestamp",
            value: timestamp_raw.to_string(),
        })?;

    let extra_data = match json["extraData"].as_str() {
        Some(hex_str) => hex::decode(strip_hex(hex_str))
            .map(Bytes::from)
            .map_err(|_| DecodeError::InvalidQuantity {
                field: "extraData",
                value: hex_str.to_string(),
            })?,
        None => Bytes::new(),
    };

    if extra_data.len() <= CANONICAL_EXTRA_DATA_LEN {
        return Ok(BlockHeader {
            number,
            timestamp,
            extra_data,
            proof_of_authority_data: None,
        });
    }

    if !poa {
        return Err(DecodeError::ExtraDataTooLong {
            number,
            len: extra_data.len(),
        });
    }

    Ok(BlockHeader {
        number,
        timestamp,
        proof_of_authority_data: Some(extra_data.slice(CANONICAL_EXTRA_DATA_LEN..)),
        extra_data: extra_data.slice(..CANONICAL_EXTRA_DATA_LEN),
    })
}

/// Calldata for `balanceOf(wallet)`.
pub fn encode_balance_of(wallet: Address) -> Bytes {
    Bytes::from(balanceOfCall { account: wallet }.abi_encode())
}

/// Decode the `uint256` returned by `balanceOf`.
pub fn decode_balance_of(data: &[u8]) -> Result<U256, DecodeError> {
    balanceOfCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| DecodeError::ReturnData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};
    use serde_json::json;

    fn topic_for(address: Address) -> B256 {
        address.into_word()
    }

    fn transfer_log(value: U256) -> RawLog {
        RawLog {
            address: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            topics: vec![
                transfer_topic(),
                topic_for(address!("1111111111111111111111111111111111111111")),
                topic_for(address!("2222222222222222222222222222222222222222")),
            ],
            data: Bytes::from(value.to_be_bytes::<32>().to_vec()),
            block_number: Some("0x121eac0".to_string()),
            transaction_hash: Some(b256!(
                "5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060"
            )),
            log_index: Some("0x1a".to_string()),
            removed: false,
        }
    }

    #[test]
    fn test_transfer_topic_matches_event_signature() {
        assert_eq!(
            transfer_topic(),
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_decode_transfer_log() {
        let decoded = decode_transfer_log(&transfer_log(U256::from(500_000_000u64))).unwrap();

        assert_eq!(decoded.from, address!("1111111111111111111111111111111111111111"));
        assert_eq!(decoded.to, address!("2222222222222222222222222222222222222222"));
        assert_eq!(decoded.value, U256::from(500_000_000u64));
        assert_eq!(decoded.log_index, 26);
        assert_eq!(decoded.block_number, 19_000_000);
    }

    #[test]
    fn test_decode_rejects_malformed_logs() {
        let mut log = transfer_log(U256::from(1));
        log.topics.truncate(1);
        assert!(matches!(
            decode_transfer_log(&log),
            Err(DecodeError::MissingTopics { found: 1 })
        ));

        let mut log = transfer_log(U256::from(1));
        log.data = Bytes::from(vec![0u8; 4]);
        assert!(matches!(
            decode_transfer_log(&log),
            Err(DecodeError::ShortData { found: 4 })
        ));

        let mut log = transfer_log(U256::from(1));
        log.log_index = None;
        assert!(matches!(
            decode_transfer_log(&log),
            Err(DecodeError::MissingLogField("logIndex"))
        ));
    }

    #[test]
    fn test_raw_log_deserializes_from_rpc_json() {
        let log: RawLog = serde_json::from_value(json!({
            "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                "0x0000000000000000000000001111111111111111111111111111111111111111",
                "0x0000000000000000000000002222222222222222222222222222222222222222"
            ],
            "data": "0x000000000000000000000000000000000000000000000000000000001dcd6500",
            "blockNumber": "0x121eac0",
            "transactionHash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
            "transactionIndex": "0x3",
            "blockHash": "0x8243343df08b9751f5ca0c5f8c9c0460d8a9b6351066fae0acbd4d3e776de8bb",
            "logIndex": "0x1a",
            "removed": false
        }))
        .unwrap();

        let expected = transfer_log(U256::from(500_000_000u64));
        assert_eq!(
            decode_transfer_log(&log).unwrap(),
            decode_transfer_log(&expected).unwrap()
        );
    }

    #[test]
    fn test_scale_amount() {
        let whale = scale_amount(U256::from(2_000_000_000_000u64), 6).unwrap();
        assert_eq!(whale, Decimal::from(2_000_000));

        let small = scale_amount(U256::from(500_000u64), 6).unwrap();
        assert_eq!(small, Decimal::new(5, 1));

        let dai = scale_amount(U256::from(1_234_500_000_000_000_000u128), 18).unwrap();
        assert_eq!(dai, Decimal::new(12345, 4));

        assert_eq!(scale_amount(U256::ZERO, 18).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_scale_amount_overflow() {
        assert!(matches!(
            scale_amount(U256::MAX, 18),
            Err(DecodeError::AmountOverflow { decimals: 18, .. })
        ));
    }

    #[test]
    fn test_receipt_prefers_effective_gas_price() {
        let receipt = decode_receipt(&json!({
            "gasUsed": "0xfde8",
            "gasPrice": "0x1",
            "effectiveGasPrice": "0x6fc23ac00",
            "status": "0x1"
        }))
        .unwrap();

        assert_eq!(receipt.gas_used, 65_000);
        assert_eq!(receipt.gas_price, 30_000_000_000);
        assert_eq!(receipt.gas_fee(), 65_000 * 30_000_000_000);
        assert_eq!(receipt.status, Some(1));
    }

    #[test]
    fn test_receipt_without_prices_or_status() {
        let receipt = decode_receipt(&json!({ "gasUsed": "0x5208", "root": "0x00" })).unwrap();

        assert_eq!(receipt.gas_price, 0);
        assert_eq!(receipt.gas_fee(), 0);
        assert_eq!(receipt.status, None);
    }

    fn block_json(extra_bytes: usize) -> Value {
        json!({
            "number": "0x3e8",
            "timestamp": "0x65e1c4c0",
            "extraData": format!("0x{}", "ab".repeat(extra_bytes)),
        })
    }

    #[test]
    fn test_canonical_block_header() {
        let header = decode_block_header(&block_json(32), false).unwrap();

        assert_eq!(header.number, 1000);
        assert_eq!(header.timestamp.timestamp(), 0x65e1c4c0);
        assert_eq!(header.extra_data.len(), 32);
        assert!(header.proof_of_authority_data.is_none());
    }

    #[test]
    fn test_poa_block_header_needs_poa_decoding() {
        assert!(matches!(
            decode_block_header(&block_json(97), false),
            Err(DecodeError::ExtraDataTooLong { number: 1000, len: 97 })
        ));

        let header = decode_block_header(&block_json(97), true).unwrap();
        assert_eq!(header.extra_data.len(), 32);
        assert_eq!(header.proof_of_authority_data.unwrap().len(), 65);
    }

    #[test]
    fn test_balance_of_round_trip_through_abi() {
        let wallet = address!("3333333333333333333333333333333333333333");
        let calldata = encode_balance_of(wallet);
        assert_eq!(&calldata[..4], &balanceOfCall::SELECTOR);

        let returned = U256::from(123_456_000_000u64).to_be_bytes::<32>();
        assert_eq!(decode_balance_of(&returned).unwrap(), U256::from(123_456_000_000u64));
        assert!(decode_balance_of(&[0u8; 3]).is_err());
    }
}
