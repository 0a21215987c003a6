//! Shared fixtures for the crate's tests.

use kestrel_chain_types::{
    ContractAddress, OutPoint, Transaction, TxId, TxInput, TxOutput, TxPayload,
};
use kestrel_state::{Coin, MemoryUtxoView};

/// Funding outpoint `n` on the synthetic coinbase-free funding tx.
pub fn coin_op(n: u8) -> OutPoint {
    OutPoint::new(TxId([0xAA; 32]), n as u32)
}

/// A view holding one confirmed, non-coinbase coin per `(n, value)`
/// pair, with the tip at height 100.
pub fn funded_view(coins: &[(u8, u64)]) -> MemoryUtxoView {
    let view = MemoryUtxoView::new();
    for &(n, value) in coins {
        view.add_coin(
            coin_op(n),
            Coin {
                value,
                height: 1,
                is_coinbase: false,
            },
        );
    }
    view.set_tip(100, kestrel_chain_types::BlockId([9; 32]));
    view
}

/// Plain transfer spending `ins`, creating one output per value in
/// `outs`. `pad` bytes of witness bulk up the first input to steer the
/// serialized size.
pub fn transfer(ins: &[OutPoint], outs: &[u64], pad: usize) -> Transaction {
    Transaction {
        version: 1,
        inputs: ins
            .iter()
            .enumerate()
            .map(|(i, prevout)| TxInput {
                prevout: *prevout,
                witness: if i == 0 { vec![0; pad] } else { Vec::new() },
            })
            .collect(),
        outputs: outs
            .iter()
            .map(|&value| TxOutput {
                value,
                script: vec![0x51],
            })
            .collect(),
        payload: TxPayload::Transfer,
        lock_time: 0,
    }
}

/// Contract call spending `ins` with the given gas price.
pub fn contract_call(ins: &[OutPoint], outs: &[u64], gas_price: u64) -> Transaction {
    Transaction {
        payload: TxPayload::ContractCall {
            gas_limit: 100_000,
            gas_price,
            contract: ContractAddress([7; 20]),
            data: vec![0xCA, 0x11],
        },
        ..transfer(ins, outs, 0)
    }
}

/// Outpoint for output `vout` of `tx`.
pub fn out_of(tx: &Transaction, vout: u32) -> OutPoint {
    OutPoint::new(tx.id(), vout)
}
