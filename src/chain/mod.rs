//! Chain Inspector
//!
//! Read-only view of live venues over JSON-RPC. Each pool costs one
//! `eth_getCode` plus one Multicall3 `aggregate3` batch; pool values are
//! computed with the same formulas the adapters use against the ledger.
//!
//! Supported families: Compound, Curve, ERC-4626.

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::abi::{ICToken, ICurveSwap, IERC20, IERC4626, IMulticall3, MULTICALL3};
use crate::adapters::valuation::curve_pool_value;
use crate::adapters::ProtocolFamily;

/// A live pool to inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    pub family: ProtocolFamily,
    pub pool: Address,
    /// Curve LP token; ignored for other families
    pub lp_token: Option<Address>,
}

impl PoolTarget {
    pub fn new(family: ProtocolFamily, pool: Address) -> Self {
        Self {
            family,
            pool,
            lp_token: None,
        }
    }

    pub fn with_lp_token(mut self, lp_token: Address) -> Self {
        self.lp_token = Some(lp_token);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub target: PoolTarget,
    pub has_code: bool,
    /// `None` when the address has no code
    pub pool_value: Option<U256>,
}

fn call3<C: SolCall>(target: Address, call: C) -> IMulticall3::Call3 {
    IMulticall3::Call3 {
        target,
        allowFailure: false,
        callData: Bytes::from(call.abi_encode()),
    }
}

fn decode_return<C: SolCall>(result: Option<&IMulticall3::Result>) -> Result<C::Return> {
    let result = result.ok_or_else(|| eyre!("Multicall3 returned too few results"))?;
    if !result.success {
        return Err(eyre!("Multicall3 sub-call failed"));
    }
    C::abi_decode_returns(&result.returnData).map_err(|e| eyre!("Failed to decode return: {}", e))
}

/// Multicall3 reads needed to value `target`
pub fn value_calls(target: &PoolTarget) -> Result<Vec<IMulticall3::Call3>> {
    match target.family {
        ProtocolFamily::Compound => Ok(vec![call3(target.pool, ICToken::getCashCall {})]),
        ProtocolFamily::Curve => {
            let lp_token = target
                .lp_token
                .ok_or_else(|| eyre!("Curve pool {} needs its LP token", target.pool))?;
            Ok(vec![
                call3(target.pool, ICurveSwap::get_virtual_priceCall {}),
                call3(lp_token, IERC20::totalSupplyCall {}),
            ])
        }
        ProtocolFamily::Erc4626 => Ok(vec![call3(target.pool, IERC4626::totalAssetsCall {})]),
        ProtocolFamily::AaveV2 => Err(eyre!("{} pools are not inspectable", target.family)),
    }
}

/// Pool value from the results of [`value_calls`], in call order
pub fn decode_value(target: &PoolTarget, results: &[IMulticall3::Result]) -> Result<U256> {
    let mut results = results.iter();
    match target.family {
        ProtocolFamily::Compound => decode_return::<ICToken::getCashCall>(results.next()),
        ProtocolFamily::Curve => {
            let virtual_price = decode_return::<ICurveSwap::get_virtual_priceCall>(results.next())?;
            let supply = decode_return::<IERC20::totalSupplyCall>(results.next())?;
            Ok(curve_pool_value(virtual_price, supply))
        }
        ProtocolFamily::Erc4626 => decode_return::<IERC4626::totalAssetsCall>(results.next()),
        ProtocolFamily::AaveV2 => Err(eyre!("{} pools are not inspectable", target.family)),
    }
}

pub struct ChainInspector {
    rpc_url: String,
}

impl ChainInspector {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Execute a Multicall3 batch in a single RPC call
    async fn execute_multicall(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(MULTICALL3)
            .input(calldata.into());

        let result = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("Failed to decode multicall: {}", e))?;

        Ok(decoded)
    }

    pub async fn has_code(&self, address: Address) -> Result<bool> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        let code = provider
            .get_code_at(address)
            .await
            .map_err(|e| eyre!("Failed to get code at {}: {}", address, e))?;
        Ok(!code.is_empty())
    }

    pub async fn snapshot(&self, target: PoolTarget) -> Result<PoolSnapshot> {
        let calls = value_calls(&target)?;
        if !self.has_code(target.pool).await? {
            warn!("No code at {} pool {}", target.family, target.pool);
            return Ok(PoolSnapshot {
                target,
                has_code: false,
                pool_value: None,
            });
        }

        let results = self.execute_multicall(calls).await?;
        let value = decode_value(&target, &results)?;
        debug!("{} pool {} value {}", target.family, target.pool, value);
        Ok(PoolSnapshot {
            target,
            has_code: true,
            pool_value: Some(value),
        })
    }

    /// Snapshot every target concurrently; failures are reported per target
    pub async fn snapshot_all(&self, targets: Vec<PoolTarget>) -> Vec<Result<PoolSnapshot>> {
        join_all(targets.into_iter().map(|target| self.snapshot(target))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolValue;

    fn ok_result(data: Vec<u8>) -> IMulticall3::Result {
        IMulticall3::Result {
            success: true,
            returnData: Bytes::from(data),
        }
    }

    #[test]
    fn test_curve_requires_lp_token() {
        let target = PoolTarget::new(ProtocolFamily::Curve, Address::repeat_byte(1));
        assert!(value_calls(&target).is_err());

        let target = target.with_lp_token(Address::repeat_byte(2));
        let calls = value_calls(&target).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].target, Address::repeat_byte(2));
    }

    #[test]
    fn test_decode_curve_value() {
        let target = PoolTarget::new(ProtocolFamily::Curve, Address::repeat_byte(1))
            .with_lp_token(Address::repeat_byte(2));
        let wad = U256::from(1_000_000_000_000_000_000u64);
        let results = vec![
            ok_result((wad * U256::from(2u64)).abi_encode()),
            ok_result((wad * U256::from(500u64)).abi_encode()),
        ];
        assert_eq!(
            decode_value(&target, &results).unwrap(),
            wad * U256::from(1_000u64)
        );
    }

    #[test]
    fn test_failed_sub_call_is_an_error() {
        let target = PoolTarget::new(ProtocolFamily::Erc4626, Address::repeat_byte(1));
        let results = vec![IMulticall3::Result {
            success: false,
            returnData: Bytes::new(),
        }];
        assert!(decode_value(&target, &results).is_err());
        assert!(decode_value(&target, &[]).is_err());
    }

    #[test]
    fn test_aave_is_not_inspectable() {
        let target = PoolTarget::new(ProtocolFamily::AaveV2, Address::repeat_byte(1));
        assert!(value_calls(&target).is_err());
    }

    #[tokio::test]
    async fn test_invalid_rpc_url_fails_before_network() {
        let inspector = ChainInspector::new("not a url");
        let target = PoolTarget::new(ProtocolFamily::Compound, Address::repeat_byte(1));
        assert!(inspector.snapshot(target).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_all_reports_each_target() {
        let inspector = ChainInspector::new("not a url");
        let targets = vec![
            PoolTarget::new(ProtocolFamily::Compound, Address::repeat_byte(1)),
            PoolTarget::new(ProtocolFamily::AaveV2, Address::repeat_byte(2)),
        ];
        let results = inspector.snapshot_all(targets).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
        // Unsupported family fails before any RPC is attempted
        let message = results[1].as_ref().unwrap_err().to_string();
        assert!(message.contains("not inspectable"));
    }
}
