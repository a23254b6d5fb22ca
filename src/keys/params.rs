//! Chain parameters: base58 version bytes, BIP44 coin type, message prefix.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub name: &'static str,
    pub p2pkh_prefix: u8,
    pub p2sh_prefix: u8,
    pub wif_prefix: u8,
    pub coin_type: u32,
    pub message_prefix: &'static str,
}

impl Default for ChainParams {
    fn default() -> Self { Self::pepecoin() }
}

impl ChainParams {
    pub fn pepecoin() -> Self {
        Self {
            name: "pepecoin",
            p2pkh_prefix: 0x38,
            p2sh_prefix: 0x16,
            wif_prefix: 0x9e,
            coin_type: 3434,
            message_prefix: "Pepecoin Signed Message:\n",
        }
    }

    /// Parameters early wallets serialized keys under (Bitcoin WIF version byte).
    pub fn bitcoin_legacy() -> Self {
        Self {
            name: "bitcoin-legacy",
            p2pkh_prefix: 0x00,
            p2sh_prefix: 0x05,
            wif_prefix: 0x80,
            coin_type: 3434,
            message_prefix: "Bitcoin Signed Message:\n",
        }
    }

    pub fn as_str(&self) -> &'static str { self.name }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pepecoin" | "pepe" | "mainnet" => Some(Self::pepecoin()),
            "bitcoin-legacy" | "legacy" => Some(Self::bitcoin_legacy()),
            _ => None,
        }
    }

    /// BIP44 path of external child `index`.
    pub fn child_path(&self, index: u32) -> String {
        format!("m/44'/{}'/0'/0/{}", self.coin_type, index)
    }
}
