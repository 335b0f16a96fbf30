//! Quantization codec at 8, 16 and 32 bits.

use ndarray::{Array1, arr1};

use crate::numeric::{Code, PackError, Tolerance, pack, unpack};

/// Reference codes and values for one integer width
struct Case<T> {
    atol: f64,
    rtol: f64,
    nnan: T,
    nmin: T,
    nmax: T,
    ninf: T,
}

impl<T: Code> Case<T> {
    fn value(&self, n: T) -> f64 {
        (n.to_f64().unwrap() * self.rtol).sinh() * (self.atol / self.rtol)
    }

    fn amin(&self) -> f64 {
        self.value(self.nmin)
    }

    fn amax(&self) -> f64 {
        self.value(self.nmax)
    }

    fn aclip(&self) -> f64 {
        self.value(self.ninf)
    }

    fn pack1(&self, a: f64) -> T {
        pack::<T, _, _>(&arr1(&[a]), self.atol, self.rtol).unwrap().codes[0]
    }

    fn unpack1(&self, n: T) -> f64 {
        unpack(&arr1(&[n]), self.atol, self.rtol).unwrap()[0]
    }

    fn check_decode(&self) {
        assert!(self.unpack1(self.nnan).is_nan());
        assert_eq!(self.unpack1(-self.ninf), f64::NEG_INFINITY);
        assert_eq!(self.unpack1(-self.nmax), -self.amax());
        assert_eq!(self.unpack1(-self.nmin), -self.amin());
        assert_eq!(self.unpack1(T::zero()), 0.0);
        assert_eq!(self.unpack1(self.nmin), self.amin());
        assert_eq!(self.unpack1(self.nmax), self.amax());
        assert_eq!(self.unpack1(self.ninf), f64::INFINITY);
    }

    fn check_encode(&self) {
        assert_eq!(self.pack1(f64::NAN), self.nnan);
        assert_eq!(self.pack1(f64::NEG_INFINITY), -self.ninf);
        assert_eq!(self.pack1(-self.amax()), -self.nmax);
        assert_eq!(self.pack1(-self.amin()), -self.nmin);
        assert_eq!(self.pack1(0.0), T::zero());
        assert_eq!(self.pack1(self.amin()), self.nmin);
        assert_eq!(self.pack1(self.amax()), self.nmax);
        assert_eq!(self.pack1(f64::INFINITY), self.ninf);
    }

    fn check_clip(&self) {
        let packed = pack::<T, _, _>(&arr1(&[-self.aclip(), self.aclip(), 1.0]), self.atol, self.rtol)
            .unwrap();
        assert_eq!(packed.codes[0], -self.ninf);
        assert_eq!(packed.codes[1], self.ninf);
        assert_eq!(packed.clipped, 2);
        // infinities are not clipped, they are exact
        let packed = pack::<T, _, _>(&arr1(&[f64::INFINITY]), self.atol, self.rtol).unwrap();
        assert_eq!(packed.clipped, 0);
    }

    fn check_round(&self) {
        let scale = self.atol / self.rtol;
        let b01 = (0.5 * self.rtol).sinh() * scale;
        let b12 = (1.5 * self.rtol).sinh() * scale;
        let a = arr1(&[
            -b12 * 1.001,
            -b12 * 0.999,
            -b01 * 1.001,
            -b01 * 0.999,
            b01 * 0.999,
            b01 * 1.001,
            b12 * 0.999,
            b12 * 1.001,
        ]);
        let codes: Vec<i64> = pack::<T, _, _>(&a, self.atol, self.rtol)
            .unwrap()
            .codes
            .iter()
            .map(|n| n.to_i64().unwrap())
            .collect();
        assert_eq!(codes, vec![-2, -1, -1, 0, 0, 1, 1, 2]);
    }

    fn check_spacing(&self) {
        let one = T::one();
        for a in [-1.0, 0.0, 1.0] {
            let n = self.pack1(a);
            let da = (self.atol.powi(2) + (a * self.rtol).powi(2)).sqrt();
            assert!(self.unpack1(n - one) < a - da / 2.0);
            assert!(self.unpack1(n) > a - da / 2.0);
            assert!(self.unpack1(n) < a + da / 2.0);
            assert!(self.unpack1(n + one) > a + da / 2.0);
        }
    }

    fn check_all(&self) {
        self.check_decode();
        self.check_encode();
        self.check_clip();
        self.check_round();
        self.check_spacing();
    }
}

#[test]
fn test_int8() {
    Case::<i8> {
        atol: 2e-6,
        rtol: 2e-1,
        nnan: -128,
        nmin: 1,
        nmax: 126,
        ninf: 127,
    }
    .check_all();
}

#[test]
fn test_int16() {
    Case::<i16> {
        atol: 2e-15,
        rtol: 2e-3,
        nnan: -32768,
        nmin: 1,
        nmax: 32766,
        ninf: 32767,
    }
    .check_all();
}

#[test]
fn test_int32() {
    Case::<i32> {
        atol: 2e-96,
        rtol: 2e-7,
        nnan: i32::MIN,
        nmin: 1,
        nmax: 2_147_483_646,
        ninf: i32::MAX,
    }
    .check_all();
}

#[test]
fn test_exact_ties_round_down() {
    // asinh is the identity this close to zero, and a power-of-two rtol
    // scales exactly, so these values land on the half-integers.
    let tolerance = Tolerance::new(1.0, 2f64.powi(-60)).unwrap();
    for (a, code) in [(0.5, 0), (1.5, 1), (2.5, 2), (-0.5, -1), (-1.5, -2), (-2.5, -3)] {
        assert_eq!(tolerance.encode::<i8>(a), (code, false), "a={a}");
    }
}

#[test]
fn test_pack_is_odd_away_from_ties() {
    let a = Array1::linspace(-3.0, 3.0, 1001);
    let pos = pack::<i16, _, _>(&a, 1e-3, 1e-2).unwrap().codes;
    let neg = pack::<i16, _, _>(&a.mapv(|v| -v), 1e-3, 1e-2).unwrap().codes;
    assert_eq!(pos, neg.mapv(|n| -n));
}

#[test]
fn test_invalid_tolerance() {
    assert_eq!(
        Tolerance::new(0.0, 1e-3),
        Err(PackError::InvalidTolerance {
            atol: 0.0,
            rtol: 1e-3
        })
    );
    assert!(pack::<i8, _, _>(&arr1(&[1.0]), 1e-3, f64::NAN).is_err());
}
