use async_trait::async_trait;
use ethabi::{Function, Token};
use web3::transports::Http;
use web3::types::{Address, Bytes, CallRequest, U256};
use web3::Web3;

use crate::types::{Error, Result};

pub const LENDING_POOL_ABI: &[u8] = include_bytes!("abi/lending_pool.json");
pub const COMPTROLLER_ABI: &[u8] = include_bytes!("abi/comptroller.json");
pub const CERC20_ABI: &[u8] = include_bytes!("abi/cerc20.json");

pub fn load_abi(json: &[u8]) -> Result<ethabi::Contract> {
    Ok(ethabi::Contract::load(json)?)
}

/// Read-only `eth_call` against the latest block.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>>;
}

pub struct Web3Caller {
    web3: Web3<Http>,
}

impl Web3Caller {
    pub fn new(rpc_endpoint: &str) -> Result<Self> {
        let transport = Http::new(rpc_endpoint)?;
        log::info!("[Web3Caller::new] Using RPC endpoint: {}", rpc_endpoint);
        Ok(Self {
            web3: Web3::new(transport),
        })
    }
}

#[async_trait]
impl ContractCaller for Web3Caller {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let call_req = CallRequest {
            from: None,
            to: Some(to),
            gas: None,
            gas_price: None,
            value: None,
            data: Some(Bytes(data)),
            transaction_type: None,
            access_list: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        };

        let raw_bytes = self.web3.eth().call(call_req, None).await?;
        Ok(raw_bytes.0)
    }
}

/// Encodes the call, sends it through `caller` and decodes the outputs with the same ABI entry.
pub async fn call_function(
    caller: &dyn ContractCaller,
    to: Address,
    function: &Function,
    params: &[Token],
) -> Result<Vec<Token>> {
    let encoded_data = function.encode_input(params)?;
    let raw_bytes = caller.call(to, encoded_data).await?;
    Ok(function.decode_output(&raw_bytes)?)
}

pub fn first_output(function: &Function, tokens: Vec<Token>) -> Result<Token> {
    tokens
        .into_iter()
        .next()
        .ok_or_else(|| Error::Decode(format!("no output tokens from {}", function.name)))
}

pub fn into_address(token: Token) -> Result<Address> {
    match token {
        Token::Address(a) => Ok(a),
        other => Err(Error::Decode(format!("expected address, got {:?}", other))),
    }
}

pub fn into_uint(token: Token) -> Result<U256> {
    match token {
        Token::Uint(v) => Ok(v),
        other => Err(Error::Decode(format!("expected uint, got {:?}", other))),
    }
}

pub fn into_string(token: Token) -> Result<String> {
    match token {
        Token::String(s) => Ok(s),
        other => Err(Error::Decode(format!("expected string, got {:?}", other))),
    }
}

pub fn into_address_list(token: Token) -> Result<Vec<Address>> {
    match token {
        Token::Array(items) => items.into_iter().map(into_address).collect(),
        other => Err(Error::Decode(format!("expected address[], got {:?}", other))),
    }
}
