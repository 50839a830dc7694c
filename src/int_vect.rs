use core::ops::{Add, Sub, Mul, Div, Neg, Index, IndexMut};
use serde::{Deserialize, Serialize};




/**
 * A statically-sized integer vector: a cell index, a refinement ratio, a
 * blocking factor, or a periodic shift. Arithmetic is component-wise, and
 * scalar multiplication and division apply to every component.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntVect<const D: usize>(#[serde(with = "crate::array")] [i64; D]);




// ============================================================================
impl<const D: usize> IntVect<D> {

    pub const fn new(data: [i64; D]) -> Self {
        Self(data)
    }

    pub const fn zero() -> Self {
        Self([0; D])
    }

    pub const fn splat(value: i64) -> Self {
        Self([value; D])
    }

    pub fn unit(axis: usize) -> Self {
        let mut data = [0; D];
        data[axis] = 1;
        Self(data)
    }

    pub fn from_fn<F: FnMut(usize) -> i64>(f: F) -> Self {
        Self(core::array::from_fn(f))
    }

    pub fn as_array(&self) -> &[i64; D] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    pub fn max_component(&self) -> i64 {
        self.iter().max().unwrap_or(0)
    }

    pub fn min_component(&self) -> i64 {
        self.iter().min().unwrap_or(0)
    }

    pub fn product(&self) -> i64 {
        self.iter().product()
    }

    pub fn all_positive(&self) -> bool {
        self.iter().all(|x| x > 0)
    }

    pub fn map<F: Fn(i64) -> i64>(&self, f: F) -> Self {
        Self::from_fn(|i| f(self.0[i]))
    }

    pub fn zip_map<F: Fn(i64, i64) -> i64>(&self, other: Self, f: F) -> Self {
        Self::from_fn(|i| f(self.0[i], other.0[i]))
    }

    /**
     * Component-wise floor division, rounding toward negative infinity. This
     * is the coarsening map for cell indexes.
     */
    pub fn div_floor(&self, ratio: Self) -> Self {
        self.zip_map(ratio, i64::div_euclid)
    }
}




// ============================================================================
impl<const D: usize> Add for IntVect<D> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a + b)
    }
}

impl<const D: usize> Sub for IntVect<D> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a - b)
    }
}

impl<const D: usize> Mul for IntVect<D> {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a * b)
    }
}

impl<const D: usize> Mul<i64> for IntVect<D> {
    type Output = Self;

    fn mul(self, other: i64) -> Self {
        self.map(|a| a * other)
    }
}

impl<const D: usize> Div for IntVect<D> {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a / b)
    }
}

impl<const D: usize> Div<i64> for IntVect<D> {
    type Output = Self;

    fn div(self, other: i64) -> Self {
        self.map(|a| a / other)
    }
}

impl<const D: usize> Neg for IntVect<D> {
    type Output = Self;

    fn neg(self) -> Self {
        self.map(|a| -a)
    }
}




// ============================================================================
impl<const D: usize> Index<usize> for IntVect<D> {
    type Output = i64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> IndexMut<usize> for IntVect<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> From<[i64; D]> for IntVect<D> {
    fn from(data: [i64; D]) -> Self {
        Self(data)
    }
}

impl<const D: usize> From<IntVect<D>> for [i64; D] {
    fn from(v: IntVect<D>) -> Self {
        v.0
    }
}

impl<const D: usize> Default for IntVect<D> {
    fn default() -> Self {
        Self::zero()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::IntVect;

    #[test]
    fn arithmetic_is_component_wise() {
        let a = IntVect::new([2, 4]);
        let b = IntVect::new([1, 3]);
        assert_eq!(a + b, IntVect::new([3, 7]));
        assert_eq!(a - b, IntVect::new([1, 1]));
        assert_eq!(a * b, IntVect::new([2, 12]));
        assert_eq!(a * 2, IntVect::new([4, 8]));
        assert_eq!(a / 2, IntVect::new([1, 2]));
        assert_eq!(a.max_component(), 4);
        assert_eq!(a.product(), 8);
    }

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        let a = IntVect::new([-1, 7, -8]);
        assert_eq!(a.div_floor(IntVect::splat(4)), IntVect::new([-1, 1, -2]));
    }

    #[test]
    fn serializes_as_a_plain_sequence() {
        let a = IntVect::new([3, -2, 5]);
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(&a, &mut buffer).unwrap();
        let b: IntVect<3> = ciborium::de::from_reader(&buffer[..]).unwrap();
        assert_eq!(a, b);
    }
}
