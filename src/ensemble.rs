use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;
use rayon::prelude::*;

use crate::common::divector::DiVector;
use crate::common::fieldsummarizer::FieldSummarizer;
use crate::common::rangevector::RangeVector;
use crate::common::samplesummary::SampleSummary;
use crate::forest::sampledtree::{SampledTree, SampledTreeState};
use crate::store::pointstore::{DensePointStore, PointStoreState, PointStoreView};
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::util::{add_nbr, add_to, check_argument, check_dimensions, divide, l1distance, nbr_finish};
use crate::visitor::attribution::AttributionVisitor;
use crate::visitor::density::{DensityVisitor, InterpolationMeasure};
use crate::visitor::impute::ImputeVisitor;
use crate::visitor::score::ScoreVisitor;
use crate::visitor::{Visitor, VisitorInfo};

/// Numeric storage width of the point and node arenas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

/// The ensemble. All operations take f64 slices of either the full
/// (shingled) dimension or, under internal shingling, one input frame.
pub trait Forest: Send + Sync {
    fn update(&mut self, point: &[f64], sequence_index: u64) -> Result<()>;
    fn score(&self, point: &[f64]) -> Result<f64>;
    fn displacement_score(&self, point: &[f64]) -> Result<f64>;
    fn attribution(&self, point: &[f64]) -> Result<DiVector>;
    fn density(&self, point: &[f64]) -> Result<f64>;
    fn directional_density(&self, point: &[f64]) -> Result<DiVector>;
    fn density_interpolant(&self, point: &[f64]) -> Result<InterpolationMeasure>;
    /// per-side distances to the nearest populated region
    fn simple_density(&self, point: &[f64]) -> Result<DiVector>;
    /// conditional samples near `point`: (score, point, distance)
    fn near_neighbor_list(
        &self,
        point: &[f64],
        percentile: usize,
    ) -> Result<Vec<(f64, Vec<f32>, f64)>>;
    /// replace the coordinates at `positions` by their conditional medians
    fn impute_missing(&self, positions: &[usize], point: &[f64]) -> Result<Vec<f64>>;
    fn conditional_field(
        &self,
        positions: &[usize],
        point: &[f64],
        centrality: f64,
        project: bool,
        max_number: usize,
    ) -> Result<SampleSummary>;
    /// iterated range forecast over `look_ahead` frames
    fn extrapolate(&self, look_ahead: usize, centrality: f64) -> Result<RangeVector<f32>>;
    /// the shingle that would result from appending `point`, uncommitted
    fn shingled_point(&self, point: &[f64]) -> Result<Vec<f64>>;

    fn dimensions(&self) -> usize;
    fn shingle_size(&self) -> usize;
    fn is_internal_shingling(&self) -> bool;
    fn is_internal_rotation(&self) -> bool;
    fn entries_seen(&self) -> u64;
    fn is_output_ready(&self) -> bool;
    fn set_cache_fraction(&mut self, fraction: f64) -> Result<()>;
    /// audit structural invariants: mass accounting, cut routing, refcounts
    fn validate(&self) -> Result<()>;
    fn to_state(&self) -> ForestState;
}

/// The concrete ensemble, parameterized over the cut-dimension width `C`,
/// the point-location width `L`, the node-pointer width `P`, the mass width
/// `N` and the storage precision `F`. The factory picks the narrowest
/// instantiation the configuration allows.
pub struct ForestCore<C, L, P, N, F>
where
    C: StoreIndex,
    L: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    dimensions: usize,
    shingle_size: usize,
    sample_size: usize,
    number_of_trees: usize,
    time_decay: f64,
    initial_accept_fraction: f64,
    cache_fraction: f64,
    parallel_enabled: bool,
    internal_shingling: bool,
    internal_rotation: bool,
    store_sequences: bool,
    output_after: usize,
    random_seed: u64,
    precision: Precision,
    entries_seen: u64,
    point_store: DensePointStore<L, F>,
    trees: Vec<SampledTree<C, P, N, F>>,
}

/// Captured state of a forest; width- and precision-agnostic, restored
/// through the same dispatch as the builder.
#[derive(Clone, Debug)]
pub struct ForestState {
    pub options: ForestOptions,
    pub entries_seen: u64,
    pub point_store: PointStoreState,
    pub trees: Vec<SampledTreeState>,
}

/// Plain configuration record; `ForestBuilder::build` validates it once.
#[derive(Clone, Debug)]
pub struct ForestOptions {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub sample_size: usize,
    pub number_of_trees: usize,
    pub time_decay: Option<f64>,
    pub initial_accept_fraction: f64,
    pub bounding_box_cache_fraction: f64,
    pub parallel_enabled: bool,
    pub internal_shingling: bool,
    pub internal_rotation: bool,
    pub store_sequences: bool,
    pub output_after: Option<usize>,
    pub random_seed: Option<u64>,
    pub precision: Precision,
}

impl Default for ForestOptions {
    fn default() -> Self {
        ForestOptions {
            dimensions: 1,
            shingle_size: 1,
            sample_size: 256,
            number_of_trees: 30,
            time_decay: None,
            initial_accept_fraction: 0.125,
            bounding_box_cache_fraction: 1.0,
            parallel_enabled: false,
            internal_shingling: true,
            internal_rotation: false,
            store_sequences: false,
            output_after: None,
            random_seed: None,
            precision: Precision::Single,
        }
    }
}

pub struct ForestBuilder {
    options: ForestOptions,
}

impl ForestBuilder {
    pub fn new(dimensions: usize, shingle_size: usize) -> Self {
        ForestBuilder {
            options: ForestOptions {
                dimensions,
                shingle_size,
                ..Default::default()
            },
        }
    }

    pub fn sample_size(&mut self, sample_size: usize) -> &mut Self {
        self.options.sample_size = sample_size;
        self
    }

    pub fn number_of_trees(&mut self, number_of_trees: usize) -> &mut Self {
        self.options.number_of_trees = number_of_trees;
        self
    }

    pub fn time_decay(&mut self, time_decay: f64) -> &mut Self {
        self.options.time_decay = Some(time_decay);
        self
    }

    pub fn initial_accept_fraction(&mut self, fraction: f64) -> &mut Self {
        self.options.initial_accept_fraction = fraction;
        self
    }

    pub fn bounding_box_cache_fraction(&mut self, fraction: f64) -> &mut Self {
        self.options.bounding_box_cache_fraction = fraction;
        self
    }

    pub fn parallel_enabled(&mut self, parallel_enabled: bool) -> &mut Self {
        self.options.parallel_enabled = parallel_enabled;
        self
    }

    pub fn internal_shingling(&mut self, internal_shingling: bool) -> &mut Self {
        self.options.internal_shingling = internal_shingling;
        self
    }

    pub fn internal_rotation(&mut self, internal_rotation: bool) -> &mut Self {
        self.options.internal_rotation = internal_rotation;
        self
    }

    pub fn store_sequences(&mut self, store_sequences: bool) -> &mut Self {
        self.options.store_sequences = store_sequences;
        self
    }

    pub fn output_after(&mut self, output_after: usize) -> &mut Self {
        self.options.output_after = Some(output_after);
        self
    }

    pub fn random_seed(&mut self, random_seed: u64) -> &mut Self {
        self.options.random_seed = Some(random_seed);
        self
    }

    pub fn precision(&mut self, precision: Precision) -> &mut Self {
        self.options.precision = precision;
        self
    }

    pub fn build(&self) -> Result<Box<dyn Forest>> {
        build_forest(&self.options)
    }
}

fn validate_options(options: &ForestOptions) -> Result<()> {
    check_argument(options.dimensions > 0, "dimensions must be positive")?;
    check_argument(options.shingle_size > 0, "shingle size must be positive")?;
    check_argument(
        options.shingle_size == 1 || options.dimensions % options.shingle_size == 0,
        "shingle size must divide dimensions",
    )?;
    check_argument(options.sample_size > 3, "sample size must exceed 3")?;
    check_argument(
        options.number_of_trees > 0,
        "number of trees must be positive",
    )?;
    check_argument(
        !options.internal_rotation || options.internal_shingling,
        "internal rotation requires internal shingling",
    )?;
    check_argument(
        options.time_decay.unwrap_or(0.0) >= 0.0,
        "time decay cannot be negative",
    )?;
    check_argument(
        (0.0..=1.0).contains(&options.bounding_box_cache_fraction),
        "bounding box cache fraction must be in [0,1]",
    )?;
    check_argument(
        options.initial_accept_fraction > 0.0 && options.initial_accept_fraction <= 1.0,
        "initial accept fraction must be in (0,1]",
    )?;
    Ok(())
}

/// Instantiate the narrowest forest the configuration allows.
pub fn build_forest(options: &ForestOptions) -> Result<Box<dyn Forest>> {
    validate_options(options)?;
    let point_capacity = options.sample_size * options.number_of_trees + 1;
    let small = options.dimensions < u8::MAX as usize && options.sample_size <= u8::MAX as usize + 1;
    let small = small && point_capacity + options.sample_size <= u16::MAX as usize;
    let medium =
        options.dimensions < u16::MAX as usize && options.sample_size <= u16::MAX as usize + 1;
    Ok(match (options.precision, small, medium) {
        (Precision::Single, true, _) => {
            Box::new(ForestCore::<u8, usize, u16, u8, f32>::new(options)?)
        }
        (Precision::Single, false, true) => {
            Box::new(ForestCore::<u16, usize, usize, u16, f32>::new(options)?)
        }
        (Precision::Single, false, false) => {
            Box::new(ForestCore::<usize, usize, usize, usize, f32>::new(options)?)
        }
        (Precision::Double, true, _) => {
            Box::new(ForestCore::<u8, usize, u16, u8, f64>::new(options)?)
        }
        (Precision::Double, false, true) => {
            Box::new(ForestCore::<u16, usize, usize, u16, f64>::new(options)?)
        }
        (Precision::Double, false, false) => {
            Box::new(ForestCore::<usize, usize, usize, usize, f64>::new(options)?)
        }
    })
}

/// Restore a forest from captured state through the same width dispatch.
pub fn forest_from_state(state: &ForestState, validate_heap: bool) -> Result<Box<dyn Forest>> {
    validate_options(&state.options)?;
    let options = &state.options;
    let point_capacity = options.sample_size * options.number_of_trees + 1;
    let small = options.dimensions < u8::MAX as usize && options.sample_size <= u8::MAX as usize + 1;
    let small = small && point_capacity + options.sample_size <= u16::MAX as usize;
    let medium =
        options.dimensions < u16::MAX as usize && options.sample_size <= u16::MAX as usize + 1;
    Ok(match (options.precision, small, medium) {
        (Precision::Single, true, _) => Box::new(
            ForestCore::<u8, usize, u16, u8, f32>::from_state(state, validate_heap)?,
        ),
        (Precision::Single, false, true) => Box::new(ForestCore::<u16, usize, usize, u16, f32>::from_state(
            state,
            validate_heap,
        )?),
        (Precision::Single, false, false) => Box::new(
            ForestCore::<usize, usize, usize, usize, f32>::from_state(state, validate_heap)?,
        ),
        (Precision::Double, true, _) => Box::new(
            ForestCore::<u8, usize, u16, u8, f64>::from_state(state, validate_heap)?,
        ),
        (Precision::Double, false, true) => Box::new(ForestCore::<u16, usize, usize, u16, f64>::from_state(
            state,
            validate_heap,
        )?),
        (Precision::Double, false, false) => Box::new(
            ForestCore::<usize, usize, usize, usize, f64>::from_state(state, validate_heap)?,
        ),
    })
}

impl<C, L, P, N, F> ForestCore<C, L, P, N, F>
where
    C: StoreIndex,
    L: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    pub fn new(options: &ForestOptions) -> Result<Self> {
        validate_options(options)?;
        let sample_size = options.sample_size;
        let mut point_store_capacity = sample_size * options.number_of_trees + 1;
        if point_store_capacity < 2 * sample_size {
            point_store_capacity = 2 * sample_size;
        }
        let initial_capacity = 2 * sample_size;
        let time_decay = options
            .time_decay
            .unwrap_or(0.1 / (10.0 * sample_size as f64));
        let random_seed = options
            .random_seed
            .unwrap_or_else(|| ChaCha20Rng::from_entropy().next_u64());
        let output_after = options.output_after.unwrap_or(1 + sample_size / 4);
        let mut rng = ChaCha20Rng::seed_from_u64(random_seed);
        let mut trees = Vec::with_capacity(options.number_of_trees);
        for _ in 0..options.number_of_trees {
            trees.push(SampledTree::new(
                options.dimensions,
                sample_size,
                options.internal_rotation,
                rng.next_u64(),
                options.store_sequences,
                time_decay,
                options.initial_accept_fraction,
                options.bounding_box_cache_fraction,
            ));
        }
        Ok(ForestCore {
            dimensions: options.dimensions,
            shingle_size: options.shingle_size,
            sample_size,
            number_of_trees: options.number_of_trees,
            time_decay,
            initial_accept_fraction: options.initial_accept_fraction,
            cache_fraction: options.bounding_box_cache_fraction,
            parallel_enabled: options.parallel_enabled,
            internal_shingling: options.internal_shingling,
            internal_rotation: options.internal_rotation,
            store_sequences: options.store_sequences,
            output_after,
            random_seed,
            precision: options.precision,
            entries_seen: 0,
            point_store: DensePointStore::new(
                options.dimensions,
                options.shingle_size,
                point_store_capacity,
                initial_capacity,
                options.internal_shingling,
                options.internal_rotation,
            ),
            trees,
        })
    }

    fn base_dimension(&self) -> usize {
        self.dimensions / self.shingle_size
    }

    fn check_input(&self, point: &[f64]) -> Result<()> {
        check_dimensions(
            point.len() == self.dimensions
                || (self.internal_shingling && point.len() == self.base_dimension()),
            "input must be a frame or a full shingle",
        )
    }

    fn simple_traversal<V, R, S>(
        &self,
        point: &[f64],
        parameters: &[usize],
        visitor_info: &VisitorInfo<F>,
        visitor_factory: fn(usize, &[usize], &VisitorInfo<F>) -> V,
        default: &R,
        initial: &S,
        collect_to: fn(&R, &mut S),
        finish: fn(&mut S, usize),
    ) -> Result<S>
    where
        V: Visitor<F, R>,
        R: Clone + Send + Sync,
        S: Clone,
    {
        self.check_input(point)?;
        let new_point = self.point_store.shingled_point(point)?;
        let mut answer = initial.clone();
        if self.parallel_enabled {
            let list = self
                .trees
                .par_iter()
                .map(|tree| {
                    tree.traverse(
                        &new_point,
                        &self.point_store,
                        parameters,
                        visitor_info,
                        visitor_factory,
                        default,
                    )
                })
                .collect::<Result<Vec<R>>>()?;
            list.iter().for_each(|r| collect_to(r, &mut answer));
        } else {
            let list = self
                .trees
                .iter()
                .map(|tree| {
                    tree.traverse(
                        &new_point,
                        &self.point_store,
                        parameters,
                        visitor_info,
                        visitor_factory,
                        default,
                    )
                })
                .collect::<Result<Vec<R>>>()?;
            list.iter().for_each(|r| collect_to(r, &mut answer));
        }
        finish(&mut answer, self.trees.len());
        Ok(answer)
    }

    fn conditional_field_samples(
        &self,
        positions: &[usize],
        point: &[F],
        centrality: f64,
        visitor_info: &VisitorInfo<F>,
    ) -> Result<Vec<(f64, usize, f64)>> {
        let mut list = if self.parallel_enabled {
            self.trees
                .par_iter()
                .map(|tree| {
                    tree.conditional_field(positions, centrality, point, &self.point_store, visitor_info)
                })
                .collect::<Result<Vec<(f64, usize, f64)>>>()?
        } else {
            self.trees
                .iter()
                .map(|tree| {
                    tree.conditional_field(positions, centrality, point, &self.point_store, visitor_info)
                })
                .collect::<Result<Vec<(f64, usize, f64)>>>()?
        };
        list.retain(|entry| entry.1 != usize::MAX);
        list.sort_by(|a, b| a.2.partial_cmp(&b.2).expect("finite distances"));
        Ok(list)
    }

    fn conditional_field_internal(
        &self,
        positions: &[usize],
        point: &[F],
        centrality: f64,
        project: bool,
        max_number: usize,
    ) -> Result<SampleSummary> {
        let visitor_info = VisitorInfo::<F>::default();
        let samples =
            self.conditional_field_samples(positions, point, centrality, &visitor_info)?;
        if samples.is_empty() {
            return Err(crate::errors::ForestError::NotReady {
                msg: "no conditional samples available yet",
            });
        }
        let mut points = Vec::with_capacity(samples.len());
        let mut distances = Vec::with_capacity(samples.len());
        for (_score, index, distance) in &samples {
            points.push(self.point_store.copy_f32(*index)?);
            distances.push(*distance);
        }
        let summarizer = FieldSummarizer::new(centrality, project, max_number, l1distance);
        Ok(summarizer.summarize_list(&points, &distances, positions))
    }

    pub fn validate_core(&self) -> Result<()> {
        let mut expected = std::collections::HashMap::new();
        for tree in &self.trees {
            tree.validate(&self.point_store)?;
            let mut leaves = Vec::new();
            tree.collect_leaves(&mut leaves);
            // coalesced duplicates hold one reference per copy
            for (point_index, mass) in leaves {
                *expected.entry(point_index).or_insert(0usize) += mass;
            }
        }
        for (point_index, count) in expected {
            crate::util::check_state(
                self.point_store.reference_count(point_index) == count,
                "reference count does not match tree membership",
            )?;
        }
        Ok(())
    }
}

impl<C, L, P, N, F> Forest for ForestCore<C, L, P, N, F>
where
    C: StoreIndex,
    L: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    fn update(&mut self, point: &[f64], _sequence_index: u64) -> Result<()> {
        self.check_input(point)?;
        if let Some(point_index) = self.point_store.add(point)? {
            let point_store = &self.point_store;
            let results = if self.parallel_enabled {
                self.trees
                    .par_iter_mut()
                    .map(|tree| tree.update(point_index, point_store))
                    .collect::<Result<Vec<(Option<usize>, Option<usize>)>>>()?
            } else {
                self.trees
                    .iter_mut()
                    .map(|tree| tree.update(point_index, point_store))
                    .collect::<Result<Vec<(Option<usize>, Option<usize>)>>>()?
            };
            self.point_store.adjust_count(&results)?;
            self.point_store.dec(point_index)?;
            self.entries_seen += 1;
        }
        Ok(())
    }

    fn score(&self, point: &[f64]) -> Result<f64> {
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        self.simple_traversal(
            point,
            &[],
            &VisitorInfo::<F>::default(),
            ScoreVisitor::create,
            &0.0,
            &0.0,
            add_to,
            divide,
        )
    }

    fn displacement_score(&self, point: &[f64]) -> Result<f64> {
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        self.simple_traversal(
            point,
            &[],
            &VisitorInfo::<F>::displacement(),
            ScoreVisitor::create,
            &0.0,
            &0.0,
            add_to,
            divide,
        )
    }

    fn attribution(&self, point: &[f64]) -> Result<DiVector> {
        if !self.is_output_ready() {
            return Ok(DiVector::empty(self.dimensions));
        }
        let parameters = [self.dimensions];
        self.simple_traversal(
            point,
            &parameters,
            &VisitorInfo::<F>::default(),
            AttributionVisitor::create,
            &DiVector::empty(self.dimensions),
            &DiVector::empty(self.dimensions),
            DiVector::add_to,
            DiVector::divide,
        )
    }

    fn density(&self, point: &[f64]) -> Result<f64> {
        self.density_interpolant(point).map(|m| m.density())
    }

    fn directional_density(&self, point: &[f64]) -> Result<DiVector> {
        self.density_interpolant(point)
            .map(|m| m.directional_density())
    }

    fn density_interpolant(&self, point: &[f64]) -> Result<InterpolationMeasure> {
        let parameters = [self.dimensions];
        self.simple_traversal(
            point,
            &parameters,
            &VisitorInfo::<F>::density(),
            DensityVisitor::create,
            &InterpolationMeasure::empty(self.dimensions, 0.0),
            &InterpolationMeasure::empty(self.dimensions, 0.0),
            InterpolationMeasure::add_to,
            InterpolationMeasure::divide,
        )
    }

    fn simple_density(&self, point: &[f64]) -> Result<DiVector> {
        self.density_interpolant(point).map(|m| m.distance)
    }

    fn near_neighbor_list(
        &self,
        point: &[f64],
        percentile: usize,
    ) -> Result<Vec<(f64, Vec<f32>, f64)>> {
        let parameters = [percentile];
        let list = self.simple_traversal(
            point,
            &parameters,
            &VisitorInfo::<F>::default(),
            ImputeVisitor::create_nbr,
            &(0.0f64, usize::MAX, f64::MAX),
            &Vec::new(),
            add_nbr,
            nbr_finish,
        )?;
        let mut answer = Vec::with_capacity(list.len());
        for (score, index, distance) in list {
            answer.push((score, self.point_store.copy_f32(index)?, distance));
        }
        Ok(answer)
    }

    fn impute_missing(&self, positions: &[usize], point: &[f64]) -> Result<Vec<f64>> {
        check_argument(!positions.is_empty(), "nothing to impute")?;
        self.check_input(point)?;
        let new_positions = if point.len() == self.dimensions {
            Vec::from(positions)
        } else {
            self.point_store.missing_indices(0, positions)?
        };
        let new_point = self.point_store.shingled_point(point)?;
        let summary =
            self.conditional_field_internal(&new_positions, &new_point, 1.0, false, 0)?;
        let mut answer: Vec<f64> = new_point.iter().map(|x| x.into_f64()).collect();
        for &position in &new_positions {
            answer[position] = summary.median[position] as f64;
        }
        Ok(answer)
    }

    fn conditional_field(
        &self,
        positions: &[usize],
        point: &[f64],
        centrality: f64,
        project: bool,
        max_number: usize,
    ) -> Result<SampleSummary> {
        self.check_input(point)?;
        let new_positions = if point.len() == self.dimensions {
            Vec::from(positions)
        } else {
            self.point_store.missing_indices(0, positions)?
        };
        let new_point = self.point_store.shingled_point(point)?;
        self.conditional_field_internal(&new_positions, &new_point, centrality, project, max_number)
    }

    fn extrapolate(&self, look_ahead: usize, centrality: f64) -> Result<RangeVector<f32>> {
        check_argument(
            self.internal_shingling,
            "extrapolation requires internal shingling",
        )?;
        check_argument(
            self.shingle_size > 1,
            "extrapolation requires shingle size above one",
        )?;
        check_argument(look_ahead > 0, "look ahead must be positive")?;
        let base = self.base_dimension();
        let mut values = Vec::with_capacity(look_ahead * base);
        let mut upper = Vec::with_capacity(look_ahead * base);
        let mut lower = Vec::with_capacity(look_ahead * base);
        let mut fictitious = self.point_store.shingled_point(&vec![0.0f64; base])?;
        for i in 0..look_ahead {
            let missing = if self.internal_rotation {
                self.point_store.next_indices(i)?
            } else {
                if i > 0 {
                    // slide the window one frame forward
                    for j in 0..(self.dimensions - base) {
                        fictitious[j] = fictitious[j + base];
                    }
                    for j in 0..base {
                        fictitious[self.dimensions - base + j] = F::zero();
                    }
                }
                ((self.dimensions - base)..self.dimensions).collect()
            };
            let summary =
                self.conditional_field_internal(&missing, &fictitious, centrality, true, 0)?;
            for j in 0..base {
                values.push(summary.median[j]);
                upper.push(summary.upper[j]);
                lower.push(summary.lower[j]);
                fictitious[missing[j]] = F::from_f64(summary.median[j] as f64);
            }
        }
        Ok(RangeVector::create(&values, &upper, &lower))
    }

    fn shingled_point(&self, point: &[f64]) -> Result<Vec<f64>> {
        self.check_input(point)?;
        Ok(self
            .point_store
            .shingled_point(point)?
            .iter()
            .map(|x| x.into_f64())
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    fn is_internal_shingling(&self) -> bool {
        self.internal_shingling
    }

    fn is_internal_rotation(&self) -> bool {
        self.internal_rotation
    }

    fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    fn is_output_ready(&self) -> bool {
        self.entries_seen >= self.output_after as u64
    }

    fn set_cache_fraction(&mut self, fraction: f64) -> Result<()> {
        check_argument(
            (0.0..=1.0).contains(&fraction),
            "bounding box cache fraction must be in [0,1]",
        )?;
        self.cache_fraction = fraction;
        let point_store = &self.point_store;
        for tree in self.trees.iter_mut() {
            tree.set_cache_fraction(fraction, point_store)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.validate_core()
    }

    fn to_state(&self) -> ForestState {
        ForestState {
            options: ForestOptions {
                dimensions: self.dimensions,
                shingle_size: self.shingle_size,
                sample_size: self.sample_size,
                number_of_trees: self.number_of_trees,
                time_decay: Some(self.time_decay),
                initial_accept_fraction: self.initial_accept_fraction,
                bounding_box_cache_fraction: self.cache_fraction,
                parallel_enabled: self.parallel_enabled,
                internal_shingling: self.internal_shingling,
                internal_rotation: self.internal_rotation,
                store_sequences: self.store_sequences,
                output_after: Some(self.output_after),
                random_seed: Some(self.random_seed),
                precision: self.precision,
            },
            entries_seen: self.entries_seen,
            point_store: self.point_store.to_state(),
            trees: self.trees.iter().map(|t| t.to_state()).collect(),
        }
    }
}

impl<C, L, P, N, F> ForestCore<C, L, P, N, F>
where
    C: StoreIndex,
    L: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    pub fn from_state(state: &ForestState, validate_heap: bool) -> Result<Self> {
        let options = &state.options;
        let point_store = DensePointStore::from_state(&state.point_store)?;
        let mut trees = Vec::with_capacity(state.trees.len());
        for tree_state in &state.trees {
            trees.push(SampledTree::from_state(
                tree_state,
                &point_store,
                validate_heap,
            )?);
        }
        Ok(ForestCore {
            dimensions: options.dimensions,
            shingle_size: options.shingle_size,
            sample_size: options.sample_size,
            number_of_trees: options.number_of_trees,
            time_decay: options.time_decay.unwrap_or(0.0),
            initial_accept_fraction: options.initial_accept_fraction,
            cache_fraction: options.bounding_box_cache_fraction,
            parallel_enabled: options.parallel_enabled,
            internal_shingling: options.internal_shingling,
            internal_rotation: options.internal_rotation,
            store_sequences: options.store_sequences,
            output_after: options.output_after.unwrap_or(1 + options.sample_size / 4),
            random_seed: options.random_seed.unwrap_or(0),
            precision: options.precision,
            entries_seen: state.entries_seen,
            point_store,
            trees,
        })
    }
}
