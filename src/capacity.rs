//! Capacity planner: bundle a zone's requests into truck loads.
//!
//! Greedy best-fit packing against the admissible profiles. Requests are
//! visited earliest-requested first; each goes into the open load that is
//! left with the fewest free slots after insertion, and a new load is opened
//! only when none fits.

use tracing::{debug, warn};

use crate::config::CapacityOptions;
use crate::model::{
    DateWindow, LoadId, Request, RequestId, SizeCategory, SizeMix, TruckLoad, UnassignedReason, UnassignedRequest,
    ZoneKey,
};

/// A load produced by packing, before the coordinator numbers it.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedLoad {
    pub zone: ZoneKey,
    pub requests: Vec<RequestId>,
    pub signature: SizeMix,
    pub profile: SizeMix,
    pub date_window: Option<DateWindow>,
}

impl PackedLoad {
    fn open(zone: &ZoneKey, request: &Request, profile: SizeMix) -> Self {
        Self {
            zone: zone.clone(),
            requests: vec![request.id],
            signature: SizeMix::of(request.size),
            profile,
            date_window: request.date_window,
        }
    }

    /// Holds a large item; closed to everything else.
    fn is_dedicated(&self) -> bool {
        self.signature.large > 0
    }

    pub fn into_load(self, id: LoadId) -> TruckLoad {
        TruckLoad {
            id,
            zone: self.zone,
            requests: self.requests,
            signature: self.signature,
            profile: self.profile,
            date_window: self.date_window,
            finalized: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackingOutcome {
    pub loads: Vec<PackedLoad>,
    pub unassigned: Vec<UnassignedRequest>,
}

#[derive(Debug, Clone)]
pub struct CapacityPlanner<'a> {
    options: &'a CapacityOptions,
}

impl<'a> CapacityPlanner<'a> {
    pub fn new(options: &'a CapacityOptions) -> Self {
        Self { options }
    }

    /// Closest admissible profile `mix` fits within, with its free slot count.
    /// Ties go to the profile listed first.
    pub fn best_profile(&self, mix: &SizeMix) -> Option<(SizeMix, u16)> {
        let mut best: Option<(SizeMix, u16)> = None;
        for profile in self.options.profiles.iter().filter(|profile| mix.fits_within(profile)) {
            let remaining = profile.total() - mix.total();
            if best.is_none_or(|(_, fewest)| remaining < fewest) {
                best = Some((*profile, remaining));
            }
        }
        best
    }

    /// True when the mix exactly fills one of the profiles.
    pub fn is_full(&self, mix: &SizeMix) -> bool {
        self.options.profiles.contains(mix)
    }

    /// Pack one zone's requests.
    pub fn pack(&self, zone: &ZoneKey, requests: &[&Request]) -> PackingOutcome {
        let mut ordered = requests.to_vec();
        // Stable: equal dates keep input order, undated requests go last
        ordered.sort_by_key(|request| (request.requested_on.is_none(), request.requested_on));

        let mut outcome = PackingOutcome::default();
        for request in ordered {
            let Some((single_profile, _)) = self.best_profile(&SizeMix::of(request.size)) else {
                warn!(request = %request.id, size = %request.size, "no capacity profile holds this size");
                outcome.unassigned.push(UnassignedRequest {
                    request: request.id,
                    reason: UnassignedReason::NoAdmissibleProfile,
                });
                continue;
            };

            if request.size != SizeCategory::Large {
                if let Some(index) = self.best_fit(&outcome.loads, request) {
                    let load = &mut outcome.loads[index];
                    load.requests.push(request.id);
                    load.signature = load.signature.with(request.size).unwrap_or(load.signature);
                    load.date_window = merge_windows(load.date_window, request.date_window).flatten();
                    if let Some((profile, _)) = self.best_profile(&load.signature) {
                        load.profile = profile;
                    }
                    continue;
                }
            }

            if self
                .options
                .max_loads_per_batch
                .is_some_and(|limit| outcome.loads.len() >= limit)
            {
                debug!(request = %request.id, zone = %zone, "batch load limit reached");
                outcome.unassigned.push(UnassignedRequest {
                    request: request.id,
                    reason: UnassignedReason::BatchLimitReached,
                });
                continue;
            }
            outcome.loads.push(PackedLoad::open(zone, request, single_profile));
        }

        if !self.options.dispatch_partial_loads {
            let (full, partial): (Vec<_>, Vec<_>) = outcome
                .loads
                .into_iter()
                .partition(|load| self.is_full(&load.signature));
            outcome.loads = full;
            for load in partial {
                debug!(zone = %zone, signature = %load.signature, "carrying partial load forward");
                outcome
                    .unassigned
                    .extend(load.requests.into_iter().map(|request| UnassignedRequest {
                        request,
                        reason: UnassignedReason::PartialLoadCarried,
                    }));
            }
        }

        debug!(
            zone = %zone,
            loads = outcome.loads.len(),
            unassigned = outcome.unassigned.len(),
            "packed zone"
        );
        outcome
    }

    /// Open load with the fewest free slots after taking `request`; ties go to
    /// the earliest-opened load.
    fn best_fit(&self, loads: &[PackedLoad], request: &Request) -> Option<usize> {
        let mut best: Option<(usize, u16)> = None;
        for (index, load) in loads.iter().enumerate() {
            if load.is_dedicated() {
                continue;
            }
            if merge_windows(load.date_window, request.date_window) == Some(None) {
                continue;
            }
            let Some(grown) = load.signature.with(request.size) else {
                continue;
            };
            let Some((_, remaining)) = self.best_profile(&grown) else {
                continue;
            };
            if best.is_none_or(|(_, fewest)| remaining < fewest) {
                best = Some((index, remaining));
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Combined window of two members. `None` = both unconstrained,
/// `Some(None)` = disjoint.
fn merge_windows(a: Option<DateWindow>, b: Option<DateWindow>) -> Option<Option<DateWindow>> {
    match (a, b) {
        (None, None) => None,
        (Some(window), None) | (None, Some(window)) => Some(Some(window)),
        (Some(a), Some(b)) => Some(a.intersection(&b)),
    }
}
