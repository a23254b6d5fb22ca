//! Wire vocabulary shared by the dispatcher and the page provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VaultError, VaultResult};
use crate::tx::parse_coin_value;

/// Every message the background understands, plus the response types it
/// relays to pages. Serialized names are the wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    CreateWallet,
    ResetWallet,
    Authenticate,
    IsOnboardingComplete,
    IsSessionAuthenticated,
    SignOut,
    DeleteWallet,
    GenerateAddress,
    DeleteAddress,
    SelectAddress,
    UpdateAddressNickname,
    GetPepecoinPrice,
    GetAddressBalance,
    GetTransactions,
    GetTransactionDetails,
    CreateTransaction,
    SendTransaction,
    SignPsbt,
    SendPsbt,
    SignMessage,
    DecryptMessage,
    GetConnectedClients,
    NotifyTransactionSuccess,

    ClientRequestConnection,
    ClientRequestConnectionResponse,
    ClientRequestTransaction,
    ClientRequestTransactionResponse,
    ClientRequestPsbt,
    ClientRequestPsbtResponse,
    ClientRequestSignedMessage,
    ClientRequestSignedMessageResponse,
    ClientRequestDecryptedMessage,
    ClientRequestDecryptedMessageResponse,

    ClientRequestBalance,
    ClientGetBalanceResponse,
    ClientDisconnect,
    ClientDisconnectResponse,
    ClientConnectionStatus,
    ClientConnectionStatusResponse,
    ClientTransactionStatus,
    ClientTransactionStatusResponse,
}

impl MessageType {
    pub fn as_str(&self) -> String {
        match serde_json::to_value(self) {
            Ok(Value::String(s)) => s,
            _ => format!("{self:?}"),
        }
    }

    pub fn parse(value: &str) -> VaultResult<Self> {
        serde_json::from_value(Value::String(value.to_string()))
            .map_err(|_| VaultError::validation(format!("unknown message type {value:?}")))
    }

    /// Messages a web page may send through its content script.
    pub fn is_page_request(&self) -> bool {
        matches!(
            self,
            MessageType::ClientRequestConnection
                | MessageType::ClientRequestTransaction
                | MessageType::ClientRequestPsbt
                | MessageType::ClientRequestSignedMessage
                | MessageType::ClientRequestDecryptedMessage
                | MessageType::ClientRequestBalance
                | MessageType::ClientDisconnect
                | MessageType::ClientConnectionStatus
                | MessageType::ClientTransactionStatus
        )
    }

    /// The tab message type that answers a page request.
    pub fn response_type(&self) -> Option<MessageType> {
        Some(match self {
            MessageType::ClientRequestConnection => MessageType::ClientRequestConnectionResponse,
            MessageType::ClientRequestTransaction => MessageType::ClientRequestTransactionResponse,
            MessageType::ClientRequestPsbt => MessageType::ClientRequestPsbtResponse,
            MessageType::ClientRequestSignedMessage => MessageType::ClientRequestSignedMessageResponse,
            MessageType::ClientRequestDecryptedMessage => MessageType::ClientRequestDecryptedMessageResponse,
            MessageType::ClientRequestBalance => MessageType::ClientGetBalanceResponse,
            MessageType::ClientDisconnect => MessageType::ClientDisconnectResponse,
            MessageType::ClientConnectionStatus => MessageType::ClientConnectionStatusResponse,
            MessageType::ClientTransactionStatus => MessageType::ClientTransactionStatusResponse,
            _ => return None,
        })
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub recipient_address: String,
    /// Coin amount, number or decimal string.
    pub pepe_amount: Value,
}

impl PaymentRequest {
    pub fn validate(&self) -> VaultResult<u64> {
        if self.recipient_address.trim().is_empty() {
            return Err(VaultError::validation("recipientAddress is required"));
        }
        let sats = parse_coin_value(&self.pepe_amount)?;
        if sats == 0 {
            return Err(VaultError::validation("pepeAmount must be greater than zero"));
        }
        Ok(sats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsbtRequest {
    pub raw_tx: String,
    pub indexes: Vec<usize>,
    #[serde(default)]
    pub sign_only: bool,
    #[serde(default)]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sighash_type: Option<u32>,
}

impl PsbtRequest {
    pub fn validate(&self) -> VaultResult<()> {
        if self.raw_tx.trim().is_empty() || self.indexes.is_empty() {
            return Err(VaultError::validation("rawTx and indexes are required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

impl MessageRequest {
    pub fn validate(&self) -> VaultResult<()> {
        if self.message.is_empty() {
            return Err(VaultError::validation("message is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatusRequest {
    pub tx_id: String,
}

impl TxStatusRequest {
    pub fn validate(&self) -> VaultResult<()> {
        if self.tx_id.trim().is_empty() {
            return Err(VaultError::validation("txId is required"));
        }
        if !is_txid(&self.tx_id) {
            return Err(VaultError::validation("txId must be 64 hex characters"));
        }
        Ok(())
    }
}

/// 32 bytes of hex, the only shape a txid may take in an indexer path.
pub fn is_txid(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Deserialize a request payload; shape errors are validation errors.
pub fn parse_data<T: serde::de::DeserializeOwned>(data: &Value) -> VaultResult<T> {
    serde_json::from_value(data.clone()).map_err(|e| VaultError::validation(format!("invalid data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names() {
        assert_eq!(MessageType::GetPepecoinPrice.as_str(), "getPepecoinPrice");
        assert_eq!(MessageType::ClientRequestPsbt.as_str(), "clientRequestPsbt");
        assert_eq!(MessageType::ClientGetBalanceResponse.as_str(), "clientGetBalanceResponse");
        assert_eq!(MessageType::parse("clientRequestConnection").unwrap(), MessageType::ClientRequestConnection);
        assert!(MessageType::parse("createNftTransaction").is_err());
    }

    #[test]
    fn test_response_pairs() {
        assert_eq!(
            MessageType::ClientRequestBalance.response_type(),
            Some(MessageType::ClientGetBalanceResponse)
        );
        assert_eq!(MessageType::SignOut.response_type(), None);
        assert!(MessageType::ClientDisconnect.is_page_request());
        assert!(!MessageType::ClientRequestConnectionResponse.is_page_request());
    }

    #[test]
    fn test_payment_validation() {
        let ok: PaymentRequest = parse_data(&json!({"recipientAddress": "Pabc", "pepeAmount": "1.5"})).unwrap();
        assert_eq!(ok.validate().unwrap(), 150_000_000);
        let zero: PaymentRequest = parse_data(&json!({"recipientAddress": "Pabc", "pepeAmount": 0})).unwrap();
        assert!(zero.validate().is_err());
        assert!(parse_data::<PaymentRequest>(&json!({"pepeAmount": 1})).is_err());
    }

    #[test]
    fn test_tx_status_needs_a_txid() {
        let ok = TxStatusRequest { tx_id: "ab".repeat(32) };
        assert!(ok.validate().is_ok());
        let bad = vec![
            String::new(),
            "f00d".to_string(),
            "../wallet/rpc".to_string(),
            format!("{}?x=1", "ab".repeat(31)),
            "zz".repeat(32),
        ];
        for tx_id in bad {
            assert!(TxStatusRequest { tx_id: tx_id.clone() }.validate().is_err(), "{tx_id}");
        }
    }

    #[test]
    fn test_psbt_validation() {
        let req: PsbtRequest = parse_data(&json!({"rawTx": "cHNidP8=", "indexes": []})).unwrap();
        assert!(req.validate().is_err());
        let req: PsbtRequest = parse_data(&json!({"rawTx": "cHNidP8=", "indexes": [0], "sighashType": 131})).unwrap();
        assert!(req.validate().is_ok());
        assert!(!req.sign_only);
    }
}
