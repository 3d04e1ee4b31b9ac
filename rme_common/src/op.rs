//! Operator boilerplate for transparent numeric newtypes.
//!
//! `op!(binary T, Add, add)` expands to the obvious `impl Add for T` that
//! delegates to the wrapped value. `inplace` and `unary` cover the
//! `*Assign` and single-operand traits respectively.

#[macro_export]
macro_rules! op {
    (binary $t:ty, $op:ident, $fn:ident) => {
        impl std::ops::$op for $t {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$op::$fn(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $op:ident, $fn:ident) => {
        impl std::ops::$op for $t {
            fn $fn(&mut self, rhs: Self) {
                std::ops::$op::$fn(&mut self.0, rhs.0);
            }
        }
    };
    (unary $t:ty, $op:ident, $fn:ident) => {
        impl std::ops::$op for $t {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(std::ops::$op::$fn(self.0))
            }
        }
    };
}
