//! Comfort scoring and ranking of route options.

use std::cmp::Ordering;

use ridewise_core::{
    DemandPrediction, DemandPredictor, HistorySource, RouteHistory, RouteInsight, RouteOption,
    RoutePreferences, ScoredRoute, TimestampMs, TrafficCondition, TrafficPrediction,
    TrafficPredictor,
};

use crate::{demand_or_neutral, traffic_or_neutral};

/// Weight applied to the predicted duration in seconds.
pub const DURATION_WEIGHT: f64 = 0.6;

/// Penalty per unit of predicted occupancy when avoiding crowds.
pub const CROWDING_PENALTY: f64 = 40.0;

/// Multiplier applied under heavy traffic.
pub const HEAVY_MULTIPLIER: f64 = 1.3;

/// Multiplier applied under moderate traffic.
pub const MODERATE_MULTIPLIER: f64 = 1.1;

/// Occupancy at or above which a route is flagged as crowded.
pub const CROWDED_THRESHOLD: f64 = 0.75;

/// Confidence below which a route is flagged as uncertain.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Predictors and history consulted while evaluating candidates.
#[derive(Clone, Copy)]
pub struct PredictionInputs<'a> {
    /// Travel-time predictor.
    pub traffic: &'a dyn TrafficPredictor,
    /// Occupancy predictor.
    pub demand: &'a dyn DemandPredictor,
    /// Past observations per route.
    pub history: &'a dyn HistorySource,
}

/// Turns predictions and preferences into comfort scores and rankings.
///
/// The scorer is stateless; every method is a pure function of its inputs.
///
/// # Examples
///
/// ```
/// use ridewise_core::{DemandPrediction, RoutePreferences, TrafficPrediction};
/// use ridewise_core::test_support::route;
/// use ridewise_scorer::RouteScorer;
///
/// let option = route("R1", &[1_000.0]);
/// let traffic = TrafficPrediction::neutral(&option, 0);
/// let demand = DemandPrediction::neutral(0);
/// let score = RouteScorer.score(&option, &traffic, &demand, &RoutePreferences::default());
/// assert_eq!(score, 600.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteScorer;

impl RouteScorer {
    /// Comfort score for one route; lower is better.
    ///
    /// `duration * 0.6`, plus `occupancy * 40` when the rider avoids crowds,
    /// times 1.3 for heavy or 1.1 for moderate traffic, rounded to one
    /// decimal. A non-finite predicted duration falls back to the route's
    /// timetable.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "the comfort score is a weighted sum of float predictions"
    )]
    pub fn score(
        self,
        route: &RouteOption,
        traffic: &TrafficPrediction,
        demand: &DemandPrediction,
        preferences: &RoutePreferences,
    ) -> f64 {
        let duration = effective_duration(route, traffic);
        let crowding = if preferences.avoid_crowds {
            clamp_unit(demand.predicted_occupancy) * CROWDING_PENALTY
        } else {
            0.0
        };
        let raw = (duration * DURATION_WEIGHT + crowding) * congestion_multiplier(traffic.condition);
        round_tenth(raw)
    }

    /// Score `route` and attach its insights.
    #[must_use]
    pub fn score_route(
        self,
        route: RouteOption,
        traffic: TrafficPrediction,
        demand: DemandPrediction,
        preferences: &RoutePreferences,
    ) -> ScoredRoute {
        let comfort_score = self.score(&route, &traffic, &demand, preferences);
        let insights = insights(&traffic, &demand);
        ScoredRoute {
            predicted_duration_sec: effective_duration(&route, &traffic),
            predicted_crowding: clamp_unit(demand.predicted_occupancy),
            comfort_score,
            insights,
            route,
            traffic,
            demand,
        }
    }

    /// Order routes best first.
    ///
    /// With `prioritize_speed` the predicted duration alone decides;
    /// otherwise the comfort score does. The sort is stable so ties keep
    /// their input order.
    #[must_use]
    pub fn rank(self, mut routes: Vec<ScoredRoute>, preferences: &RoutePreferences) -> Vec<ScoredRoute> {
        if preferences.prioritize_speed {
            routes.sort_by(|a, b| by_key(a.predicted_duration_sec, b.predicted_duration_sec));
        } else {
            routes.sort_by(|a, b| by_key(a.comfort_score, b.comfort_score));
        }
        routes
    }

    /// Filter, predict, score and rank a set of candidates.
    ///
    /// Candidates rejected by the preference filters are dropped before any
    /// predictor runs. Predictor failures fall back to neutral predictions.
    #[must_use]
    pub fn evaluate(
        self,
        candidates: Vec<RouteOption>,
        departure_ms: TimestampMs,
        preferences: &RoutePreferences,
        inputs: PredictionInputs<'_>,
    ) -> Vec<ScoredRoute> {
        let scored = candidates
            .into_iter()
            .filter(|route| preferences.admits(route))
            .map(|route| {
                let history = route
                    .primary_route_id()
                    .map_or_else(RouteHistory::empty, |id| inputs.history.history(id));
                let traffic = traffic_or_neutral(inputs.traffic, &route, departure_ms, &history);
                let demand = demand_or_neutral(inputs.demand, &route, departure_ms, &history);
                self.score_route(route, traffic, demand, preferences)
            })
            .collect();
        self.rank(scored, preferences)
    }
}

/// Insights for a pair of predictions.
#[must_use]
pub fn insights(traffic: &TrafficPrediction, demand: &DemandPrediction) -> Vec<RouteInsight> {
    let mut notes = Vec::new();
    if traffic.condition != TrafficCondition::Light {
        notes.push(RouteInsight::Traffic {
            condition: traffic.condition,
            expected_delay_sec: traffic.expected_delay_sec,
        });
    }
    if demand.predicted_occupancy >= CROWDED_THRESHOLD {
        notes.push(RouteInsight::Crowded {
            occupancy: clamp_unit(demand.predicted_occupancy),
        });
    }
    let confidence = traffic.confidence.min(demand.confidence);
    if confidence < LOW_CONFIDENCE_THRESHOLD {
        notes.push(RouteInsight::LowConfidence { confidence });
    }
    notes
}

const fn congestion_multiplier(condition: TrafficCondition) -> f64 {
    match condition {
        TrafficCondition::Heavy => HEAVY_MULTIPLIER,
        TrafficCondition::Moderate => MODERATE_MULTIPLIER,
        TrafficCondition::Light => 1.0,
    }
}

fn effective_duration(route: &RouteOption, traffic: &TrafficPrediction) -> f64 {
    if traffic.predicted_duration_sec.is_finite() {
        traffic.predicted_duration_sec
    } else {
        route.scheduled_duration_sec()
    }
}

const fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[expect(
    clippy::float_arithmetic,
    reason = "rounding to one decimal keeps scores stable across platforms"
)]
fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn by_key(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests use expect for readable failures")]
    #![expect(clippy::float_cmp, reason = "scores are rounded to exact tenths")]

    use super::*;
    use ridewise_core::test_support::{
        FixedDemandPredictor, FixedTrafficPredictor, MemoryHistory, UnavailablePredictor, route,
    };
    use ridewise_core::{RouteSegment, TransitMode};
    use rstest::{fixture, rstest};

    fn traffic(duration: f64, condition: TrafficCondition) -> TrafficPrediction {
        TrafficPrediction {
            predicted_duration_sec: duration,
            expected_delay_sec: 0.0,
            condition,
            confidence: 0.9,
            computed_at: 0,
        }
    }

    fn demand(occupancy: f64) -> DemandPrediction {
        DemandPrediction {
            predicted_occupancy: occupancy,
            confidence: 0.9,
            computed_at: 0,
        }
    }

    #[fixture]
    fn crowd_averse() -> RoutePreferences {
        RoutePreferences {
            avoid_crowds: true,
            ..RoutePreferences::default()
        }
    }

    #[rstest]
    #[case(1_000.0, TrafficCondition::Light, 0.5, false, 600.0)]
    #[case(1_000.0, TrafficCondition::Light, 0.5, true, 620.0)]
    #[case(1_000.0, TrafficCondition::Moderate, 0.5, true, 682.0)]
    #[case(1_000.0, TrafficCondition::Heavy, 0.5, true, 806.0)]
    #[case(1_234.5, TrafficCondition::Heavy, 0.0, false, 962.9)]
    #[case(0.0, TrafficCondition::Light, 1.0, true, 40.0)]
    fn scores_follow_formula(
        #[case] duration: f64,
        #[case] condition: TrafficCondition,
        #[case] occupancy: f64,
        #[case] avoid_crowds: bool,
        #[case] expected: f64,
    ) {
        let option = route("R1", &[duration]);
        let prefs = RoutePreferences {
            avoid_crowds,
            ..RoutePreferences::default()
        };
        let score = RouteScorer.score(
            &option,
            &traffic(duration, condition),
            &demand(occupancy),
            &prefs,
        );
        assert_eq!(score, expected);
    }

    #[rstest]
    fn non_finite_duration_uses_timetable() {
        let option = route("R1", &[500.0]);
        let score = RouteScorer.score(
            &option,
            &traffic(f64::NAN, TrafficCondition::Light),
            &demand(0.0),
            &RoutePreferences::default(),
        );
        assert_eq!(score, 300.0);
    }

    #[rstest]
    fn rank_is_stable_for_ties(crowd_averse: RoutePreferences) {
        let routes: Vec<ScoredRoute> = ["a", "b", "c"]
            .into_iter()
            .map(|id| {
                let option = route(id, &[600.0]);
                RouteScorer.score_route(
                    option,
                    traffic(600.0, TrafficCondition::Light),
                    demand(0.2),
                    &crowd_averse,
                )
            })
            .collect();
        let ranked = RouteScorer.rank(routes, &crowd_averse);
        let ids: Vec<&str> = ranked.iter().map(|r| r.route.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[rstest]
    fn speed_priority_ignores_comfort(crowd_averse: RoutePreferences) {
        let quick_but_packed = RouteScorer.score_route(
            route("quick", &[900.0]),
            traffic(900.0, TrafficCondition::Light),
            demand(1.0),
            &crowd_averse,
        );
        let slow_but_calm = RouteScorer.score_route(
            route("calm", &[960.0]),
            traffic(960.0, TrafficCondition::Light),
            demand(0.0),
            &crowd_averse,
        );
        let routes = vec![slow_but_calm, quick_but_packed];

        let comfort = RouteScorer.rank(routes.clone(), &crowd_averse);
        assert_eq!(comfort.first().expect("ranked").route.id, "calm");

        let speed = RoutePreferences {
            prioritize_speed: true,
            ..crowd_averse
        };
        let fastest = RouteScorer.rank(routes, &speed);
        assert_eq!(fastest.first().expect("ranked").route.id, "quick");
    }

    #[rstest]
    fn empty_input_ranks_empty() {
        assert!(
            RouteScorer
                .rank(Vec::new(), &RoutePreferences::default())
                .is_empty()
        );
    }

    #[rstest]
    #[case(TrafficCondition::Heavy, 0.8, 0.9, 2)]
    #[case(TrafficCondition::Heavy, 0.8, 0.1, 3)]
    #[case(TrafficCondition::Light, 0.8, 0.9, 1)]
    #[case(TrafficCondition::Light, 0.2, 0.1, 1)]
    #[case(TrafficCondition::Light, 0.2, 0.9, 0)]
    fn insights_reflect_predictions(
        #[case] condition: TrafficCondition,
        #[case] occupancy: f64,
        #[case] confidence: f64,
        #[case] expected: usize,
    ) {
        let mut t = traffic(600.0, condition);
        t.confidence = confidence;
        let notes = insights(&t, &demand(occupancy));
        assert_eq!(notes.len(), expected);
    }

    #[rstest]
    fn evaluate_filters_and_falls_back(crowd_averse: RoutePreferences) {
        let direct = route("direct", &[1_200.0]);
        let transfer = ridewise_core::RouteOption::new(
            "transfer",
            vec![
                RouteSegment::ride(TransitMode::Bus, "R1", 400.0),
                RouteSegment::ride(TransitMode::Rail, "L1", 300.0),
            ],
        )
        .expect("valid route");
        let prefs = RoutePreferences {
            max_transfers: Some(0),
            ..crowd_averse
        };
        let down = UnavailablePredictor::default();
        let demand_model = FixedDemandPredictor::new(0.5, 0.9);
        let history = MemoryHistory::default();

        let scored = RouteScorer.evaluate(
            vec![direct, transfer],
            0,
            &prefs,
            PredictionInputs {
                traffic: &down,
                demand: &demand_model,
                history: &history,
            },
        );

        assert_eq!(scored.len(), 1);
        let only = scored.first().expect("one route");
        assert_eq!(only.route.id, "direct");
        assert_eq!(only.traffic.condition, TrafficCondition::Light);
        assert_eq!(only.comfort_score, 740.0);
        assert_eq!(down.calls(), 1);
        assert_eq!(demand_model.calls(), 1);
        assert!(
            only.insights
                .iter()
                .any(|i| matches!(i, RouteInsight::LowConfidence { .. }))
        );
    }

    #[rstest]
    fn evaluate_uses_fixed_predictors() {
        let traffic_model = FixedTrafficPredictor::new(300.0, TrafficCondition::Heavy, 0.8);
        let demand_model = FixedDemandPredictor::new(0.9, 0.8);
        let history = MemoryHistory::default();
        let scored = RouteScorer.evaluate(
            vec![route("R1", &[600.0])],
            0,
            &RoutePreferences::default(),
            PredictionInputs {
                traffic: &traffic_model,
                demand: &demand_model,
                history: &history,
            },
        );
        let only = scored.first().expect("one route");
        assert_eq!(only.predicted_duration_sec, 900.0);
        assert_eq!(only.comfort_score, 702.0);
        assert_eq!(only.insights.len(), 2);
    }
}
