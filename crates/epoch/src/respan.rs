use alloy_primitives::{Address, U256};

/// `recommitEpoch(uint256,uint256,uint256,uint256,address)`
pub const RECOMMIT_EPOCH_SELECTOR: [u8; 4] = [0x2c, 0x91, 0xc6, 0x79];

const WORD: usize = 32;
const RECOMMIT_DATA_LEN: usize = 4 + 5 * WORD;

/// Forced signer rotation starting at `start_block`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespanCall {
    pub start_block: u64,
    pub end_block: u64,
    pub new_signer: Address,
}

/// Decodes a `recommitEpoch` call, `None` for any other calldata
pub fn decode_recommit(data: &[u8]) -> Option<RespanCall> {
    if data.len() < RECOMMIT_DATA_LEN || data[..4] != RECOMMIT_EPOCH_SELECTOR {
        return None;
    }

    let word = |i: usize| &data[4 + i * WORD..4 + (i + 1) * WORD];
    let start_block = U256::from_be_slice(word(2)).saturating_to();
    let end_block = U256::from_be_slice(word(3)).saturating_to();
    let new_signer = Address::from_slice(&word(4)[12..]);

    Some(RespanCall { start_block, end_block, new_signer })
}

/// Pending respan start heights, ascending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespanQueue(Vec<u64>);

impl RespanQueue {
    pub fn insert(&mut self, height: u64) {
        let pos = self.0.partition_point(|&h| h < height);
        self.0.insert(pos, height);
    }

    pub fn front(&self) -> Option<u64> {
        self.0.first().copied()
    }

    pub fn pop_front(&mut self) -> Option<u64> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}
