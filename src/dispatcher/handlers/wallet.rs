//! Onboarding, authentication and wallet mutations.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatcher::{Request, VaultContext};
use crate::error::{VaultError, VaultResult};
use crate::protocol::parse_data;
use crate::storage::keys;
use crate::wallet::Wallet;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWalletData {
    #[serde(default)]
    password: String,
    #[serde(default)]
    seed_phrase: Option<String>,
}

pub async fn create_wallet(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: CreateWalletData = parse_data(&req.data)?;
    if data.password.is_empty() {
        return Err(VaultError::validation("password is required"));
    }
    let _guard = ctx.lock_wallet().await;
    let wallet = Wallet::create(data.seed_phrase.as_deref(), &ctx.params)?;
    let password_blob = ctx.cipher.seal_password(&data.password)?;
    let wallet_blob = ctx.cipher.encrypt(&wallet, &data.password)?;
    let view = wallet.session_view(false);

    ctx.local.set_many(vec![
        (keys::PASSWORD.into(), serde_json::to_value(&password_blob)?),
        (keys::WALLET.into(), serde_json::to_value(&wallet_blob)?),
        (keys::ONBOARDING_COMPLETE.into(), Value::Bool(true)),
        (keys::SELECTED_ADDRESS_INDEX.into(), json!(0)),
    ])?;
    ctx.session.end()?;
    ctx.approvals.clear()?;
    ctx.session.begin(&data.password, &view)?;
    tracing::info!(imported = data.seed_phrase.is_some(), "wallet created");
    Ok(json!({ "authenticated": true, "wallet": view }))
}

#[derive(Deserialize)]
struct AuthenticateData {
    #[serde(default)]
    password: String,
    #[serde(default, rename = "_dangerouslyReturnSecretPhrase")]
    return_phrase: bool,
}

pub async fn authenticate(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: AuthenticateData = parse_data(&req.data)?;
    let verified = match ctx.stored_blob(keys::PASSWORD)? {
        Some(blob) => ctx.cipher.verify_password(&blob, &data.password),
        None => false,
    };
    if !verified {
        tracing::warn!("authentication rejected");
        return Ok(json!({ "authenticated": false, "wallet": Value::Null }));
    }

    let _guard = ctx.lock_wallet().await;
    let mut wallet = ctx.load_wallet(&data.password)?;
    if wallet.migrate(&ctx.params)? {
        let blob = ctx.cipher.encrypt(&wallet, &data.password)?;
        ctx.local.set(keys::WALLET, serde_json::to_value(&blob)?)?;
        tracing::info!(children = wallet.children.len(), "migrated stored keys to current format");
    }

    ctx.session.begin(&data.password, &wallet.session_view(false))?;
    Ok(json!({ "authenticated": true, "wallet": wallet.session_view(data.return_phrase) }))
}

pub async fn is_onboarding_complete(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    Ok(Value::Bool(ctx.onboarding_complete()?))
}

pub async fn is_session_authenticated(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    Ok(json!({
        "authenticated": ctx.session.is_authenticated()?,
        "wallet": ctx.session.wallet()?,
        "selectedAddressIndex": ctx.local.get(keys::SELECTED_ADDRESS_INDEX)?,
    }))
}

pub async fn sign_out(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    ctx.session.end()?;
    ctx.approvals.clear()?;
    tracing::info!("session ended");
    Ok(Value::Bool(true))
}

pub async fn delete_wallet(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    let _guard = ctx.lock_wallet().await;
    ctx.session.end()?;
    ctx.approvals.clear()?;
    ctx.local.remove(&[
        keys::PASSWORD,
        keys::WALLET,
        keys::ONBOARDING_COMPLETE,
        keys::SELECTED_ADDRESS_INDEX,
    ])?;
    tracing::info!("wallet deleted");
    Ok(Value::Bool(true))
}

#[derive(Deserialize, Default)]
struct NicknameData {
    #[serde(default)]
    nickname: Option<String>,
}

pub async fn generate_address(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: NicknameData = if req.data.is_null() { NicknameData::default() } else { parse_data(&req.data)? };
    let _guard = ctx.lock_wallet().await;
    let (mut wallet, password) = ctx.unlock_wallet()?;
    let position = wallet.generate_address(data.nickname.as_deref(), &ctx.params)?;
    let view = ctx.commit_wallet(&wallet, &password)?;
    tracing::info!(position, "address generated");
    Ok(json!({ "wallet": view }))
}

#[derive(Deserialize)]
struct IndexData {
    index: usize,
}

pub async fn delete_address(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: IndexData = parse_data(&req.data)?;
    let _guard = ctx.lock_wallet().await;
    let (mut wallet, password) = ctx.unlock_wallet()?;
    wallet.delete_address(data.index)?;
    let view = ctx.commit_wallet(&wallet, &password)?;

    // Keep the selection pointing at the same address, or back to the first.
    let selected = ctx.selected_index(&Value::Null)?;
    let adjusted = match selected {
        s if s == data.index => 0,
        s if s > data.index => s - 1,
        s => s,
    };
    if adjusted != selected {
        ctx.local.set(keys::SELECTED_ADDRESS_INDEX, json!(adjusted))?;
    }
    tracing::info!(position = data.index, "address deleted");
    Ok(json!({ "wallet": view }))
}

pub async fn select_address(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: IndexData = parse_data(&req.data)?;
    let view = ctx.session.wallet()?.ok_or(VaultError::AuthFailure)?;
    if data.index >= view.addresses.len() {
        return Err(VaultError::validation(format!("no address at index {}", data.index)));
    }
    ctx.local.set(keys::SELECTED_ADDRESS_INDEX, json!(data.index))?;
    Ok(json!({ "selectedAddressIndex": data.index }))
}

#[derive(Deserialize)]
struct UpdateNicknameData {
    address: String,
    nickname: String,
}

pub async fn update_address_nickname(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: UpdateNicknameData = parse_data(&req.data)?;
    let _guard = ctx.lock_wallet().await;
    let (mut wallet, password) = ctx.unlock_wallet()?;
    wallet.set_nickname(&data.address, &data.nickname)?;
    let view = ctx.commit_wallet(&wallet, &password)?;
    Ok(json!({ "wallet": view }))
}

pub async fn get_connected_clients(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    Ok(serde_json::to_value(ctx.session.connected_clients()?)?)
}
