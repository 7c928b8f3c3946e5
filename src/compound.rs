use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use web3::types::{Address, U256};

use crate::contracts::{
    call_function, first_output, into_address, into_address_list, into_string, into_uint,
    load_abi, ContractCaller, CERC20_ABI, COMPTROLLER_ABI,
};
use crate::poller::RateSource;
use crate::types::{InterestRates, MarketInfo, Result, ETH_ADDRESS};
use crate::utils::rate_per_block_to_apy;

/// The ether market has no `underlying()`.
const CETH_SYMBOL: &str = "cETH";

/// Compound markets listed by the `Comptroller`, keyed by their underlying token.
pub struct CompoundSource {
    caller: Arc<dyn ContractCaller>,
    comptroller: Address,
    comptroller_abi: ethabi::Contract,
    ctoken_abi: ethabi::Contract,
}

impl CompoundSource {
    pub fn new(caller: Arc<dyn ContractCaller>, comptroller: Address) -> Result<Self> {
        log::info!("[CompoundSource::new] Comptroller at {:?}", comptroller);
        Ok(Self {
            caller,
            comptroller,
            comptroller_abi: load_abi(COMPTROLLER_ABI)?,
            ctoken_abi: load_abi(CERC20_ABI)?,
        })
    }

    async fn get_all_markets(&self) -> Result<Vec<Address>> {
        let function = self.comptroller_abi.function("getAllMarkets")?;
        let tokens = call_function(self.caller.as_ref(), self.comptroller, function, &[]).await?;
        into_address_list(first_output(function, tokens)?)
    }

    async fn call_ctoken(&self, ctoken: Address, name: &str) -> Result<ethabi::Token> {
        let function = self.ctoken_abi.function(name)?;
        let tokens = call_function(self.caller.as_ref(), ctoken, function, &[]).await?;
        first_output(function, tokens)
    }

    async fn rate_per_block(&self, ctoken: Address, name: &str) -> Result<U256> {
        into_uint(self.call_ctoken(ctoken, name).await?)
    }

    async fn fetch_market(&self, ctoken: Address) -> Result<MarketInfo> {
        let (symbol, supply_rate, borrow_rate) = futures::try_join!(
            async { into_string(self.call_ctoken(ctoken, "symbol").await?) },
            self.rate_per_block(ctoken, "supplyRatePerBlock"),
            self.rate_per_block(ctoken, "borrowRatePerBlock"),
        )?;

        let token_address = if symbol == CETH_SYMBOL {
            ETH_ADDRESS
        } else {
            into_address(self.call_ctoken(ctoken, "underlying").await?)?
        };

        log::debug!(
            "[CompoundSource::fetch_market] {} ({:?}) supplyRatePerBlock={} borrowRatePerBlock={}",
            symbol,
            ctoken,
            supply_rate,
            borrow_rate
        );

        Ok(MarketInfo {
            token_address,
            rates: InterestRates {
                lending: rate_per_block_to_apy(supply_rate)?,
                borrowing: rate_per_block_to_apy(borrow_rate)?,
            },
        })
    }
}

#[async_trait]
impl RateSource for CompoundSource {
    fn name(&self) -> &'static str {
        "Compound"
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketInfo>> {
        let ctokens = self.get_all_markets().await?;
        log::debug!("[CompoundSource::fetch_markets] Found {} markets", ctokens.len());

        try_join_all(ctokens.into_iter().map(|ctoken| self.fetch_market(ctoken))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::testing::{selector, FnCaller};
    use crate::types::Error;
    use ethabi::Token;
    use rust_decimal::Decimal;

    struct MockMarket {
        ctoken: Address,
        symbol: &'static str,
        underlying: Address,
        supply: u64,
        borrow: u64,
    }

    fn mock_comptroller(comptroller: Address, markets: Vec<MockMarket>) -> Arc<dyn ContractCaller> {
        let comptroller_abi = load_abi(COMPTROLLER_ABI).unwrap();
        let ctoken_abi = load_abi(CERC20_ABI).unwrap();
        let all_markets = selector(comptroller_abi.function("getAllMarkets").unwrap());
        let symbol = selector(ctoken_abi.function("symbol").unwrap());
        let supply = selector(ctoken_abi.function("supplyRatePerBlock").unwrap());
        let borrow = selector(ctoken_abi.function("borrowRatePerBlock").unwrap());
        let underlying = selector(ctoken_abi.function("underlying").unwrap());

        Arc::new(FnCaller(move |to: Address, data: &[u8]| -> Result<Vec<u8>> {
            if to == comptroller && data[..4] == all_markets {
                let list = markets.iter().map(|m| Token::Address(m.ctoken)).collect();
                return Ok(ethabi::encode(&[Token::Array(list)]));
            }
            let market = markets
                .iter()
                .find(|m| m.ctoken == to)
                .ok_or_else(|| Error::Decode("unknown cToken".into()))?;
            let reply = if data[..4] == symbol {
                Token::String(market.symbol.to_string())
            } else if data[..4] == supply {
                Token::Uint(U256::from(market.supply))
            } else if data[..4] == borrow {
                Token::Uint(U256::from(market.borrow))
            } else if data[..4] == underlying {
                assert_ne!(market.symbol, CETH_SYMBOL, "cETH has no underlying()");
                Token::Address(market.underlying)
            } else {
                return Err(Error::Decode("unexpected selector".into()));
            };
            Ok(ethabi::encode(&[reply]))
        }))
    }

    #[tokio::test]
    async fn test_fetch_markets_resolves_underlying_and_eth() {
        let comptroller = Address::from_low_u64_be(0xc0);
        let dai = Address::from_low_u64_be(0xda1);
        let caller = mock_comptroller(
            comptroller,
            vec![
                MockMarket {
                    ctoken: Address::from_low_u64_be(1),
                    symbol: "cETH",
                    underlying: Address::zero(),
                    supply: 0,
                    borrow: 10_000_000_000,
                },
                MockMarket {
                    ctoken: Address::from_low_u64_be(2),
                    symbol: "cDAI",
                    underlying: dai,
                    supply: 1_000_000_000,
                    borrow: 0,
                },
            ],
        );

        let source = CompoundSource::new(caller, comptroller).unwrap();
        let markets = source.fetch_markets().await.unwrap();

        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].token_address, ETH_ADDRESS);
        assert_eq!(markets[0].rates.lending, Decimal::ZERO);
        assert_eq!(
            markets[0].rates.borrowing,
            rate_per_block_to_apy(U256::from(10_000_000_000u64)).unwrap()
        );
        assert!(markets[0].rates.borrowing > Decimal::new(24, 3));
        assert!(markets[0].rates.borrowing < Decimal::new(25, 3));

        assert_eq!(markets[1].token_address, dai);
        assert_eq!(markets[1].rates.borrowing, Decimal::ZERO);
        assert!(markets[1].rates.lending > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fetch_markets_propagates_failures() {
        let comptroller = Address::from_low_u64_be(0xc0);
        let caller = mock_comptroller(
            comptroller,
            vec![MockMarket {
                ctoken: Address::from_low_u64_be(1),
                symbol: "cDAI",
                underlying: Address::from_low_u64_be(0xda1),
                supply: 0,
                borrow: 0,
            }],
        );
        // Pointing at the wrong comptroller makes getAllMarkets hit an unknown contract.
        let source = CompoundSource::new(caller, Address::from_low_u64_be(0xbad)).unwrap();
        assert!(matches!(source.fetch_markets().await, Err(Error::Decode(_))));
    }
}
