use rand::Rng;

use crate::message::{Request, RequestKind};
use crate::samples::SamplePools;

/// Turns the shared sample pools into a stream of realistic circulation requests.
#[derive(Clone, Copy)]
pub struct RequestGenerator<'a> {
    pools: &'a SamplePools,
}

impl<'a> RequestGenerator<'a> {
    pub fn new(pools: &'a SamplePools) -> Self {
        Self { pools }
    }

    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> Request {
        let kind = RequestKind::from_roll(rng.random_range(0..100));
        self.generate(kind, rng)
    }

    pub fn generate<R: Rng + ?Sized>(&self, kind: RequestKind, rng: &mut R) -> Request {
        let pools = self.pools;

        match kind {
            RequestKind::CheckIn => Request::CheckIn {
                item: pools.barcodes.pick(rng).clone(),
                current_location: pools.branches.pick(rng).clone(),
            },
            RequestKind::CheckOut => Request::CheckOut {
                item: pools.barcodes.pick(rng).clone(),
                patron: pools.patrons.pick(rng).clone(),
                current_location: pools.branches.pick(rng).clone(),
            },
            RequestKind::ItemInformation => Request::ItemInformation {
                item: pools.barcodes.pick(rng).clone(),
            },
        }
    }

    /// `None` when sessions run without the login step.
    pub fn login<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Request> {
        let credentials = self.pools.credentials.as_ref()?;

        Some(Request::Login {
            credential: credentials.pick(rng).clone(),
        })
    }
}
