//! Ergonomic numeric surface over [`Builder`] (spec.md §4.3's operation
//! vocabulary, named plainly: `add`, `sub`, `mul`, `known`, `input`, `open`)
//!
//! `crate::builder` exposes the graph mechanics (`known`/`input`/`open`/
//! `random`/`multiply`/`register`) directly since they need tight coupling
//! with preprocessing and scope bookkeeping. This module layers the
//! zero-round linear gates from `crate::spdz` on top as plain methods on
//! [`Builder`], so a caller building a program (see `src/bin/fresco_demo.rs`
//! and `integration/main.rs`) reads as ordinary arithmetic rather than
//! hand-rolled protocol construction.

use crate::builder::result::ResultHandle;
use crate::builder::Builder;
use crate::field::Fp;
use crate::share::AuthenticatedShare;
use crate::spdz::{AddProtocol, AddPublicProtocol, MulPublicProtocol, SubProtocol};

/// Numeric operations over authenticated shares and public field elements
pub trait Numeric {
    /// `x + y`
    fn add(&self, x: ResultHandle<AuthenticatedShare>, y: ResultHandle<AuthenticatedShare>) -> ResultHandle<AuthenticatedShare>;

    /// `x - y`
    fn sub(&self, x: ResultHandle<AuthenticatedShare>, y: ResultHandle<AuthenticatedShare>) -> ResultHandle<AuthenticatedShare>;

    /// `x * constant` for a public constant known at construction time
    fn mul_known(&self, x: ResultHandle<AuthenticatedShare>, constant: Fp) -> ResultHandle<AuthenticatedShare>;

    /// `x + c` where `c` is a public field element produced elsewhere in the
    /// graph (e.g. the output of `Builder::open`)
    fn add_public(&self, x: ResultHandle<AuthenticatedShare>, c: ResultHandle<Fp>) -> ResultHandle<AuthenticatedShare>;

    /// `x - c` where `c` is a public field element produced elsewhere in the
    /// graph
    fn sub_public(&self, x: ResultHandle<AuthenticatedShare>, c: ResultHandle<Fp>) -> ResultHandle<AuthenticatedShare>;
}

impl Numeric for Builder {
    fn add(&self, x: ResultHandle<AuthenticatedShare>, y: ResultHandle<AuthenticatedShare>) -> ResultHandle<AuthenticatedShare> {
        self.register(AddProtocol::new(x.id(), y.id()))
    }

    fn sub(&self, x: ResultHandle<AuthenticatedShare>, y: ResultHandle<AuthenticatedShare>) -> ResultHandle<AuthenticatedShare> {
        self.register(SubProtocol::new(x.id(), y.id()))
    }

    fn mul_known(&self, x: ResultHandle<AuthenticatedShare>, constant: Fp) -> ResultHandle<AuthenticatedShare> {
        self.register(MulPublicProtocol::new(x.id(), constant))
    }

    fn add_public(&self, x: ResultHandle<AuthenticatedShare>, c: ResultHandle<Fp>) -> ResultHandle<AuthenticatedShare> {
        self.register(AddPublicProtocol::new(x.id(), c.id(), self.party_id(), false))
    }

    fn sub_public(&self, x: ResultHandle<AuthenticatedShare>, c: ResultHandle<Fp>) -> ResultHandle<AuthenticatedShare> {
        self.register(AddPublicProtocol::new(x.id(), c.id(), self.party_id(), true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::preprocessing::DummySource;

    #[test]
    fn mul_known_is_eligible_immediately_once_its_argument_resolves() {
        let builder = Builder::new(0, vec![1], Box::new(DummySource::new(0)));
        let known = builder.known(Fp::from_u64(4));
        // `known` resolves immediately at construction, so the scaled
        // share's dependency is already satisfied
        let x = builder.input(0, Some(Fp::from_u64(4))).unwrap();
        let _ = builder.mul_known(x, Fp::from_u64(3));
        let _ = known;
    }
}
