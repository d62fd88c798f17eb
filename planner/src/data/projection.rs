use tracing::info;

use crate::config::const_funcs::calc_annual_growth_rate;
use crate::config::simulation_config::{ProjectionConfig, ScenarioTimeline};
use crate::data::store::SettlementStore;

impl SettlementStore {
    /// Projects population to every analysis year with separate urban and
    /// rural growth rates that reach the end-year population and urban ratio.
    /// Returns the (urban, rural) annual growth rates.
    pub fn project_pop_and_urban(
        &mut self,
        projection: &ProjectionConfig,
        timeline: &ScenarioTimeline,
        years: &[u32],
    ) -> (f64, f64) {
        let (urban_start, rural_start) = self.settlements().iter().fold((0.0, 0.0), |(u, r), s| {
            if s.is_urban {
                (u + s.pop_start, r)
            } else {
                (u, r + s.pop_start)
            }
        });

        let span = timeline.end_year - timeline.start_year;
        let ratio_end = projection.urban_ratio_end.clamp(0.0, 1.0);
        let urban_growth = calc_annual_growth_rate(urban_start, projection.end_year_pop * ratio_end, span);
        let rural_growth = calc_annual_growth_rate(rural_start, projection.end_year_pop * (1.0 - ratio_end), span);

        for s in self.settlements_mut() {
            let growth = if s.is_urban { urban_growth } else { rural_growth };
            s.projected_pop.clear();
            for &year in years {
                let elapsed = year.saturating_sub(timeline.start_year) as i32;
                s.projected_pop.insert(year, s.pop_start * (1.0 + growth).powi(elapsed));
            }
        }

        info!(
            "Projected population with urban growth {:.4} and rural growth {:.4} per year",
            urban_growth, rural_growth
        );
        (urban_growth, rural_growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::poi::Coordinate;
    use crate::models::settlement::Settlement;
    use approx::assert_relative_eq;

    #[test]
    fn end_year_totals_and_shares_match() {
        let mut urban = Settlement::new(1, Coordinate::new(0.0, 0.0), 400.0, "Est");
        urban.is_urban = true;
        let rural_a = Settlement::new(2, Coordinate::new(0.1, 0.0), 300.0, "Est");
        let rural_b = Settlement::new(3, Coordinate::new(0.2, 0.0), 300.0, "Est");
        let mut store = SettlementStore::new(vec![urban, rural_a, rural_b]).unwrap();

        let timeline = ScenarioTimeline { base_year: 2020, start_year: 2020, end_year: 2030, discount_rate: 0.08 };
        let projection = ProjectionConfig { end_year_pop: 2000.0, urban_ratio_end: 0.5 };
        store.project_pop_and_urban(&projection, &timeline, &[2025, 2030]);

        assert_relative_eq!(store.total_population(2030), 2000.0, epsilon = 1e-6);
        assert_relative_eq!(store.get(0).population_in(2030), 1000.0, epsilon = 1e-6);
        // Rural settlements keep equal shares
        assert_relative_eq!(store.get(1).population_in(2025), store.get(2).population_in(2025), epsilon = 1e-9);
        assert!(store.get(0).population_in(2025) > 400.0 && store.get(0).population_in(2025) < 1000.0);
    }
}
