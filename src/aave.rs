use std::sync::Arc;

use async_trait::async_trait;
use ethabi::Token;
use futures::future::try_join_all;
use web3::types::Address;

use crate::contracts::{
    call_function, first_output, into_address_list, into_uint, load_abi, ContractCaller,
    LENDING_POOL_ABI,
};
use crate::poller::RateSource;
use crate::types::{Error, InterestRates, MarketInfo, Result};
use crate::utils::ray_to_fraction;

// Positions inside the `ReserveData` struct returned by `getReserveData`.
const CURRENT_LIQUIDITY_RATE: usize = 3;
const CURRENT_VARIABLE_BORROW_RATE: usize = 4;

/// Aave v2 reserves read from the `LendingPool` contract.
pub struct AaveSource {
    caller: Arc<dyn ContractCaller>,
    lending_pool: Address,
    abi: ethabi::Contract,
}

impl AaveSource {
    pub fn new(caller: Arc<dyn ContractCaller>, lending_pool: Address) -> Result<Self> {
        log::info!("[AaveSource::new] LendingPool at {:?}", lending_pool);
        Ok(Self {
            caller,
            lending_pool,
            abi: load_abi(LENDING_POOL_ABI)?,
        })
    }

    async fn get_reserves_list(&self) -> Result<Vec<Address>> {
        let function = self.abi.function("getReservesList")?;
        let tokens = call_function(self.caller.as_ref(), self.lending_pool, function, &[]).await?;
        into_address_list(first_output(function, tokens)?)
    }

    async fn fetch_reserve_data(&self, asset: Address) -> Result<InterestRates> {
        let function = self.abi.function("getReserveData")?;
        let tokens = call_function(
            self.caller.as_ref(),
            self.lending_pool,
            function,
            &[Token::Address(asset)],
        )
        .await?;

        let mut fields = match first_output(function, tokens)? {
            Token::Tuple(fields) if fields.len() > CURRENT_VARIABLE_BORROW_RATE => fields,
            other => {
                return Err(Error::Decode(format!(
                    "expected ReserveData tuple, got {:?}",
                    other
                )))
            }
        };

        let borrowing = into_uint(fields.swap_remove(CURRENT_VARIABLE_BORROW_RATE))?;
        let lending = into_uint(fields.swap_remove(CURRENT_LIQUIDITY_RATE))?;

        log::debug!(
            "[AaveSource::fetch_reserve_data] asset={:?} liquidityRate={} variableBorrowRate={}",
            asset,
            lending,
            borrowing
        );

        Ok(InterestRates {
            lending: ray_to_fraction(lending)?,
            borrowing: ray_to_fraction(borrowing)?,
        })
    }
}

#[async_trait]
impl RateSource for AaveSource {
    fn name(&self) -> &'static str {
        "Aave"
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketInfo>> {
        let reserves = self.get_reserves_list().await?;
        log::debug!("[AaveSource::fetch_markets] Found {} reserves", reserves.len());

        // try_join_all keeps the getReservesList order.
        let rates = try_join_all(reserves.iter().map(|asset| self.fetch_reserve_data(*asset))).await?;

        Ok(reserves
            .into_iter()
            .zip(rates)
            .map(|(token_address, rates)| MarketInfo {
                token_address,
                rates,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::testing::{address_arg, selector, FnCaller};
    use rust_decimal::Decimal;
    use web3::types::U256;

    fn ray(percent_thousandths: u64) -> U256 {
        // 1 unit = 0.001% = 1e22 ray
        U256::from(percent_thousandths) * U256::exp10(22)
    }

    fn reserve_data(liquidity_rate: U256, variable_borrow_rate: U256) -> Vec<u8> {
        ethabi::encode(&[Token::Tuple(vec![
            Token::Tuple(vec![Token::Uint(U256::zero())]),
            Token::Uint(U256::exp10(27)),
            Token::Uint(U256::exp10(27)),
            Token::Uint(liquidity_rate),
            Token::Uint(variable_borrow_rate),
            Token::Uint(U256::zero()),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Uint(U256::from(3u8)),
        ])])
    }

    fn mock_pool(reserves: Vec<(Address, U256, U256)>) -> Arc<dyn ContractCaller> {
        let abi = load_abi(LENDING_POOL_ABI).unwrap();
        let list_sel = selector(abi.function("getReservesList").unwrap());
        let data_sel = selector(abi.function("getReserveData").unwrap());

        Arc::new(FnCaller(move |_to: Address, data: &[u8]| -> Result<Vec<u8>> {
            if data[..4] == list_sel {
                let list = reserves.iter().map(|(a, _, _)| Token::Address(*a)).collect();
                Ok(ethabi::encode(&[Token::Array(list)]))
            } else if data[..4] == data_sel {
                let asset = address_arg(data);
                let (_, lending, borrowing) = reserves
                    .iter()
                    .find(|(a, _, _)| *a == asset)
                    .ok_or_else(|| Error::Decode("unknown reserve".into()))?;
                Ok(reserve_data(*lending, *borrowing))
            } else {
                Err(Error::Decode("unexpected selector".into()))
            }
        }))
    }

    #[tokio::test]
    async fn test_fetch_markets_converts_rays_in_list_order() {
        let dai = Address::from_low_u64_be(0xda1);
        let usdc = Address::from_low_u64_be(0x05dc);
        let caller = mock_pool(vec![
            (dai, ray(2_500), ray(4_125)),
            (usdc, U256::zero(), ray(1)),
        ]);

        let source = AaveSource::new(caller, Address::from_low_u64_be(7)).unwrap();
        let markets = source.fetch_markets().await.unwrap();

        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].token_address, dai);
        assert_eq!(markets[0].rates.lending, Decimal::new(25, 3));
        assert_eq!(markets[0].rates.borrowing, Decimal::new(4125, 5));
        assert_eq!(markets[1].token_address, usdc);
        assert_eq!(markets[1].rates.lending, Decimal::ZERO);
        assert_eq!(markets[1].rates.borrowing, Decimal::new(1, 5));
    }

    #[tokio::test]
    async fn test_fetch_markets_empty_pool() {
        let source = AaveSource::new(mock_pool(vec![]), Address::zero()).unwrap();
        assert!(source.fetch_markets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_markets_fails_on_bad_reply() {
        let caller: Arc<dyn ContractCaller> =
            Arc::new(FnCaller(|_to: Address, _data: &[u8]| -> Result<Vec<u8>> {
                Ok(vec![0u8; 3])
            }));
        let source = AaveSource::new(caller, Address::zero()).unwrap();
        assert!(source.fetch_markets().await.is_err());
    }
}
