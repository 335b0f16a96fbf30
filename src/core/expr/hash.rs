//! Structural hashing of expression nodes.
//!
//! Hashes all content that takes part in equality, combining the cached
//! hashes of children instead of walking the graph again.

use super::ExprKind;
use crate::core::shape::Shape;

// FNV-1a constants
const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

#[inline(always)]
fn hash_u64(mut hash: u64, n: u64) -> u64 {
    for byte in n.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[inline(always)]
fn hash_byte(mut hash: u64, b: u8) -> u64 {
    hash ^= u64::from(b);
    hash.wrapping_mul(FNV_PRIME)
}

fn hash_dims(hash: u64, dims: &[usize]) -> u64 {
    let h = hash_u64(hash, dims.len() as u64);
    dims.iter().fold(h, |acc, &d| hash_u64(acc, d as u64))
}

fn hash_str(hash: u64, s: &str) -> u64 {
    s.as_bytes().iter().fold(hash, |acc, &b| hash_byte(acc, b))
}

pub(super) fn compute_hash(kind: &ExprKind, shape: &Shape) -> u64 {
    let h = hash_dims(FNV_OFFSET, shape);
    match kind {
        ExprKind::Zero => hash_byte(h, b'0'),
        ExprKind::Constant(array) => {
            let h = hash_byte(h, b'C');
            array.iter().fold(h, |acc, v| hash_u64(acc, v.to_bits()))
        }
        ExprKind::Coords(ndims) => hash_u64(hash_byte(h, b'X'), *ndims as u64),
        ExprKind::Argument(arg) => hash_str(hash_byte(h, b'A'), arg.name()),
        ExprKind::PointData(data) => {
            let h = hash_byte(h, b'P');
            let h = hash_u64(h, data.sample.id());
            hash_dims(h, data.values.shape())
        }
        ExprKind::Unary(op, a) => {
            let h = hash_str(hash_byte(h, b'U'), op.name());
            hash_u64(h, a.structural_hash())
        }
        // Ordered: operands are not reordered during construction
        ExprKind::Binary(op, a, b) => {
            let h = hash_str(hash_byte(h, b'B'), op.name());
            let h = hash_u64(h, a.structural_hash());
            hash_u64(h, b.structural_hash())
        }
        ExprKind::Sum { arg, axis } => {
            let h = hash_u64(hash_byte(h, b'S'), *axis as u64);
            hash_u64(h, arg.structural_hash())
        }
        ExprKind::Take { arg, axis, index } => {
            let h = hash_u64(hash_byte(h, b'T'), *axis as u64);
            let h = hash_u64(h, *index as u64);
            hash_u64(h, arg.structural_hash())
        }
        ExprKind::InsertAxis { arg, axis, length } => {
            let h = hash_u64(hash_byte(h, b'I'), *axis as u64);
            let h = hash_u64(h, *length as u64);
            hash_u64(h, arg.structural_hash())
        }
        ExprKind::Transpose { arg, axes } => {
            let h = hash_dims(hash_byte(h, b'R'), axes);
            hash_u64(h, arg.structural_hash())
        }
        // Samples compare by value, so only value-derived content is hashed
        ExprKind::Integral { integrand, sample } => {
            let h = hash_byte(h, b'Q');
            let h = hash_u64(h, sample.npoints() as u64);
            let h = hash_u64(h, sample.nelems() as u64);
            hash_u64(h, integrand.structural_hash())
        }
    }
}
