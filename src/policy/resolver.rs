use crate::constraints::ResolutionConstraints;
use crate::policy::TrackableResolutionRequest;
use crate::resolution::Resolution;

/// Dominant-wins merge: returns the most demanding entry, or `None` for an
/// empty input.
///
/// The result does not depend on input order: entries that compare equal
/// under [`Resolution::cmp_demand`] are equal by value.
#[must_use]
pub fn resolve_dominant(demands: &[Resolution]) -> Option<Resolution> {
    demands.iter().copied().max_by(Resolution::cmp_demand)
}

/// The publisher's own baseline for a trackable.
///
/// The constraints-selected entry when the trackable has constraints,
/// otherwise the LOCAL request, if any.
#[must_use]
pub fn select_baseline(request: &TrackableResolutionRequest<'_>) -> Option<Resolution> {
    match request.trackable.constraints.as_ref() {
        Some(constraints) => Some(
            constraints
                .resolutions()
                .select(request.state.proximity_reached, request.state.subscriber_present),
        ),
        None => request.local,
    }
}

/// Coarsens `baseline` when the battery is below the constraints' threshold.
#[must_use]
pub fn derate_baseline(
    baseline: Resolution,
    constraints: &ResolutionConstraints,
    battery_level: Option<f32>,
) -> Resolution {
    if constraints.is_low_battery(battery_level) {
        baseline.derated(constraints.low_battery_multiplier())
    } else {
        baseline
    }
}

/// Effective resolution for one trackable.
///
/// With constraints, the selected baseline is derated on low battery and then
/// merged with the subscriber requests, which are never derated. Without
/// constraints, the LOCAL and subscriber requests are merged directly and
/// `default` answers an empty demand set.
#[must_use]
pub fn resolve_trackable(
    request: &TrackableResolutionRequest<'_>,
    default: Resolution,
) -> Resolution {
    let baseline = match (select_baseline(request), request.trackable.constraints.as_ref()) {
        (Some(baseline), Some(constraints)) => {
            Some(derate_baseline(baseline, constraints, request.state.battery_level))
        }
        (baseline, _) => baseline,
    };

    let demands: Vec<Resolution> = baseline
        .into_iter()
        .chain(request.remote.iter().copied())
        .collect();
    resolve_dominant(&demands).unwrap_or(default)
}
