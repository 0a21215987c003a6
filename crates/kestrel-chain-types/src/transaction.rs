//! The Kestrel transaction model.
//!
//! Kestrel is a UTXO chain; a transaction spends outpoints and creates
//! outputs. A transaction may additionally carry an execution payload
//! (contract creation or call) which the VM layer interprets. The pool
//! and policy layers only dispatch on the payload tag, never execute it.

use crate::codec::{write_var_bytes, CodecError, CodecResult, SliceReader};
use crate::ids::{ContractAddress, TxId};

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    /// Creating transaction.
    pub txid: TxId,
    /// Output index within that transaction.
    pub vout: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

/// Transaction input: the outpoint being spent plus its unlocking witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Output being consumed.
    pub prevout: OutPoint,
    /// Signature/witness bytes (opaque to the pool).
    pub witness: Vec<u8>,
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    /// Locking script bytes (opaque to the pool).
    pub script: Vec<u8>,
}

/// Optional execution payload carried by a transaction.
///
/// Policy code dispatches on this tag explicitly; there is no virtual
/// transaction hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPayload {
    /// Plain value transfer.
    Transfer,
    /// Deploy contract code.
    ContractCreate {
        /// Gas ceiling for execution.
        gas_limit: u64,
        /// Price per gas unit in satoshis.
        gas_price: u64,
        /// Contract bytecode.
        code: Vec<u8>,
    },
    /// Call an existing contract.
    ContractCall {
        /// Gas ceiling for execution.
        gas_limit: u64,
        /// Price per gas unit in satoshis.
        gas_price: u64,
        /// Callee address.
        contract: ContractAddress,
        /// Call data.
        data: Vec<u8>,
    },
}

const PAYLOAD_TAG_TRANSFER: u8 = 0;
const PAYLOAD_TAG_CREATE: u8 = 1;
const PAYLOAD_TAG_CALL: u8 = 2;

/// Signature-op cost units charged per input.
const SIG_OP_COST_PER_INPUT: u64 = 1;

/// Extra sig-op cost units charged for carrying an execution payload.
const SIG_OP_COST_CONTRACT: u64 = 4;

/// A Kestrel transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Format version.
    pub version: u16,
    /// Inputs (non-empty for anything relayable).
    pub inputs: Vec<TxInput>,
    /// Outputs (non-empty for anything relayable).
    pub outputs: Vec<TxOutput>,
    /// Optional execution payload.
    pub payload: TxPayload,
    /// Earliest height (or unix time, if large) at which the
    /// transaction is final.
    pub lock_time: u32,
}

impl Transaction {
    /// Transaction identity: blake2b-256 over the serialized bytes.
    pub fn id(&self) -> TxId {
        TxId::hash(&self.to_bytes())
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        self.to_bytes().len() as u64
    }

    /// Whether the transaction carries an execution payload.
    pub fn has_contract_payload(&self) -> bool {
        !matches!(self.payload, TxPayload::Transfer)
    }

    /// Gas price of the execution payload, if any.
    pub fn gas_price(&self) -> Option<u64> {
        match self.payload {
            TxPayload::Transfer => None,
            TxPayload::ContractCreate { gas_price, .. }
            | TxPayload::ContractCall { gas_price, .. } => Some(gas_price),
        }
    }

    /// Total declared gas, zero for plain transfers.
    pub fn gas_limit(&self) -> u64 {
        match self.payload {
            TxPayload::Transfer => 0,
            TxPayload::ContractCreate { gas_limit, .. }
            | TxPayload::ContractCall { gas_limit, .. } => gas_limit,
        }
    }

    /// Signature-operation cost used for ancestor accounting.
    ///
    /// One unit per input signature check, plus a fixed surcharge when
    /// an execution payload rides along. The upstream validator charges
    /// the measured cost; this is the policy-layer stand-in.
    pub fn sig_op_cost(&self) -> u64 {
        let base = self.inputs.len() as u64 * SIG_OP_COST_PER_INPUT;
        if self.has_contract_payload() {
            base + SIG_OP_COST_CONTRACT
        } else {
            base
        }
    }

    /// Sum of output values.
    pub fn value_out(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Serialize to bytes.
    ///
    /// Format: version (2) | input count (4) | inputs | output count (4)
    /// | outputs | payload tag (1) + payload | lock_time (4).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&self.version.to_be_bytes());

        out.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for input in &self.inputs {
            out.extend_from_slice(input.prevout.txid.as_bytes());
            out.extend_from_slice(&input.prevout.vout.to_be_bytes());
            write_var_bytes(&mut out, &input.witness);
        }

        out.extend_from_slice(&(self.outputs.len() as u32).to_be_bytes());
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_be_bytes());
            write_var_bytes(&mut out, &output.script);
        }

        match &self.payload {
            TxPayload::Transfer => out.push(PAYLOAD_TAG_TRANSFER),
            TxPayload::ContractCreate {
                gas_limit,
                gas_price,
                code,
            } => {
                out.push(PAYLOAD_TAG_CREATE);
                out.extend_from_slice(&gas_limit.to_be_bytes());
                out.extend_from_slice(&gas_price.to_be_bytes());
                write_var_bytes(&mut out, code);
            }
            TxPayload::ContractCall {
                gas_limit,
                gas_price,
                contract,
                data,
            } => {
                out.push(PAYLOAD_TAG_CALL);
                out.extend_from_slice(&gas_limit.to_be_bytes());
                out.extend_from_slice(&gas_price.to_be_bytes());
                out.extend_from_slice(&contract.0);
                write_var_bytes(&mut out, data);
            }
        }

        out.extend_from_slice(&self.lock_time.to_be_bytes());
        out
    }

    /// Deserialize from bytes, rejecting trailing garbage.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut r = SliceReader::new(bytes);
        let tx = Self::decode(&mut r)?;
        r.finish()?;
        Ok(tx)
    }

    /// Decode from a reader positioned at a transaction, leaving the
    /// reader after it.
    pub fn decode(r: &mut SliceReader<'_>) -> CodecResult<Self> {
        let version = r.read_u16()?;

        let input_count = r.read_u32()? as usize;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            let txid = TxId(r.read_array::<32>()?);
            let vout = r.read_u32()?;
            let witness = r.read_var_bytes()?;
            inputs.push(TxInput {
                prevout: OutPoint::new(txid, vout),
                witness,
            });
        }

        let output_count = r.read_u32()? as usize;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            let value = r.read_u64()?;
            let script = r.read_var_bytes()?;
            outputs.push(TxOutput { value, script });
        }

        let payload = match r.read_u8()? {
            PAYLOAD_TAG_TRANSFER => TxPayload::Transfer,
            PAYLOAD_TAG_CREATE => TxPayload::ContractCreate {
                gas_limit: r.read_u64()?,
                gas_price: r.read_u64()?,
                code: r.read_var_bytes()?,
            },
            PAYLOAD_TAG_CALL => TxPayload::ContractCall {
                gas_limit: r.read_u64()?,
                gas_price: r.read_u64()?,
                contract: ContractAddress(r.read_array::<20>()?),
                data: r.read_var_bytes()?,
            },
            tag => return Err(CodecError::InvalidTag(tag)),
        };

        let lock_time = r.read_u32()?;

        Ok(Self {
            version,
            inputs,
            outputs,
            payload,
            lock_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                prevout: OutPoint::new(TxId([7; 32]), 3),
                witness: vec![0xaa, 0xbb],
            }],
            outputs: vec![TxOutput {
                value: 50_000,
                script: vec![0x51],
            }],
            payload: TxPayload::Transfer,
            lock_time: 0,
        }
    }

    fn call_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                prevout: OutPoint::new(TxId([9; 32]), 0),
                witness: vec![],
            }],
            outputs: vec![TxOutput {
                value: 10_000,
                script: vec![],
            }],
            payload: TxPayload::ContractCall {
                gas_limit: 250_000,
                gas_price: 40,
                contract: ContractAddress([2; 20]),
                data: vec![1, 2, 3, 4],
            },
            lock_time: 0,
        }
    }

    #[test]
    fn test_round_trip_transfer() {
        let tx = transfer_tx();
        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.id(), decoded.id());
    }

    #[test]
    fn test_round_trip_contract_call() {
        let tx = call_tx();
        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(tx, decoded);
        assert!(decoded.has_contract_payload());
        assert_eq!(decoded.gas_price(), Some(40));
    }

    #[test]
    fn test_id_changes_with_content() {
        let mut tx = transfer_tx();
        let before = tx.id();
        tx.outputs[0].value += 1;
        assert_ne!(before, tx.id());
    }

    #[test]
    fn test_sig_op_cost() {
        assert_eq!(transfer_tx().sig_op_cost(), 1);
        assert_eq!(call_tx().sig_op_cost(), 5);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut bytes = transfer_tx().to_bytes();
        bytes.push(0);
        assert!(matches!(
            Transaction::from_bytes(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_bad_payload_tag() {
        let mut bytes = transfer_tx().to_bytes();
        // Payload tag sits 4 bytes before the end (lock_time).
        let at = bytes.len() - 5;
        bytes[at] = 0x9c;
        assert_eq!(
            Transaction::from_bytes(&bytes),
            Err(CodecError::InvalidTag(0x9c))
        );
    }

    #[test]
    fn test_size_matches_encoding() {
        let tx = call_tx();
        assert_eq!(tx.size(), tx.to_bytes().len() as u64);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_outpoint() -> impl Strategy<Value = OutPoint> {
            (prop::array::uniform32(any::<u8>()), any::<u32>())
                .prop_map(|(id, vout)| OutPoint::new(TxId(id), vout))
        }

        fn arb_input() -> impl Strategy<Value = TxInput> {
            (arb_outpoint(), prop::collection::vec(any::<u8>(), 0..64))
                .prop_map(|(prevout, witness)| TxInput { prevout, witness })
        }

        fn arb_output() -> impl Strategy<Value = TxOutput> {
            (any::<u64>(), prop::collection::vec(any::<u8>(), 0..32))
                .prop_map(|(value, script)| TxOutput { value, script })
        }

        fn arb_payload() -> impl Strategy<Value = TxPayload> {
            prop_oneof![
                Just(TxPayload::Transfer),
                (any::<u64>(), any::<u64>(), prop::collection::vec(any::<u8>(), 0..64))
                    .prop_map(|(gas_limit, gas_price, code)| TxPayload::ContractCreate {
                        gas_limit,
                        gas_price,
                        code,
                    }),
                (
                    any::<u64>(),
                    any::<u64>(),
                    prop::array::uniform20(any::<u8>()),
                    prop::collection::vec(any::<u8>(), 0..64),
                )
                    .prop_map(|(gas_limit, gas_price, addr, data)| {
                        TxPayload::ContractCall {
                            gas_limit,
                            gas_price,
                            contract: ContractAddress(addr),
                            data,
                        }
                    }),
            ]
        }

        proptest! {
            #[test]
            fn round_trip_any_transaction(
                version in any::<u16>(),
                inputs in prop::collection::vec(arb_input(), 0..4),
                outputs in prop::collection::vec(arb_output(), 0..4),
                payload in arb_payload(),
                lock_time in any::<u32>(),
            ) {
                let tx = Transaction {
                    version,
                    inputs,
                    outputs,
                    payload,
                    lock_time,
                };
                let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
                prop_assert_eq!(&tx, &decoded);
                prop_assert_eq!(tx.id(), decoded.id());
            }
        }
    }
}
