//! Blocks and block headers.
//!
//! Field layout matches `protocol/types/block.go`; wire encoding is spec
//! §6's: `chain_id ‖ version ‖ height ‖ timestamp ‖ previous ‖
//! transaction_root ‖ witness_root ‖ proof_bytes`.

use crate::hash::Hash;
use crate::proof::Proof;
use crate::tx::Tx;
use crate::wire;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub chain_id: Hash,
    pub version: u64,
    pub height: u64,
    pub timestamp: u64,
    pub previous: Hash,
    pub transaction_root: Hash,
    pub witness_root: Hash,
    pub proof: Proof,
}

impl BlockHeader {
    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(self.chain_id.bytes())?;
        wire::write_u64(w, self.version)?;
        wire::write_u64(w, self.height)?;
        wire::write_u64(w, self.timestamp)?;
        w.write_all(self.previous.bytes())?;
        w.write_all(self.transaction_root.bytes())?;
        w.write_all(self.witness_root.bytes())?;
        self.proof.encode(w)
    }

    pub fn decode(r: &mut impl Read) -> io::Result<BlockHeader> {
        let mut chain_id = [0u8; 32];
        r.read_exact(&mut chain_id)?;
        let version = wire::read_u64(r)?;
        let height = wire::read_u64(r)?;
        let timestamp = wire::read_u64(r)?;
        let mut previous = [0u8; 32];
        r.read_exact(&mut previous)?;
        let mut transaction_root = [0u8; 32];
        r.read_exact(&mut transaction_root)?;
        let mut witness_root = [0u8; 32];
        r.read_exact(&mut witness_root)?;
        let mut proof_bytes = [0u8; crate::proof::Proof::ENCODED_SIZE];
        r.read_exact(&mut proof_bytes)?;
        let proof = Proof::from_bytes(&proof_bytes)?;

        Ok(BlockHeader {
            chain_id: Hash(chain_id),
            version,
            height,
            timestamp,
            previous: Hash(previous),
            transaction_root: Hash(transaction_root),
            witness_root: Hash(witness_root),
            proof,
        })
    }

    fn encoded(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf).expect("encoding into a Vec cannot fail");
        buf
    }

    /// Content hash of the header: `sha3_256(encode(header))`.
    pub fn hash(&self) -> Hash {
        Hash::sha3(&self.encoded())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Tx>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Full on-disk layout (spec §6): header length-prefixed, then each
    /// transaction length-prefixed, lengths as LE u64.
    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        let header_bytes = self.header.encoded();
        wire::write_u64(w, header_bytes.len() as u64)?;
        w.write_all(&header_bytes)?;

        wire::write_u64(w, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            let mut tx_buf = Vec::new();
            tx.encode(&mut tx_buf)?;
            wire::write_u64(w, tx_buf.len() as u64)?;
            w.write_all(&tx_buf)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> io::Result<Block> {
        let header_len = wire::read_u64(r)? as usize;
        let mut header_buf = vec![0u8; header_len];
        r.read_exact(&mut header_buf)?;
        let mut header_cur = &header_buf[..];
        let header = BlockHeader::decode(&mut header_cur)?;

        let n_tx = wire::read_u64(r)?;
        let mut transactions = Vec::with_capacity(n_tx as usize);
        for _ in 0..n_tx {
            let tx_len = wire::read_u64(r)? as usize;
            let mut tx_buf = vec![0u8; tx_len];
            r.read_exact(&mut tx_buf)?;
            let mut tx_cur = &tx_buf[..];
            transactions.push(Tx::decode(&mut tx_cur)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
