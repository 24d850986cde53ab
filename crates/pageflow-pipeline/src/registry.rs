//! Process-wide component registry and the resolved run configuration.

use crate::component::PipelineComponent;
use crate::matching::{MatchMetric, MatchingService};
use crate::order::TextOrderService;
use crate::parsing::PageParsingService;
use crate::table::{TableSegmentationService, TiePolicy};
use once_cell::sync::Lazy;
use pageflow_core::{Category, PageflowError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Fully resolved configuration a component factory builds from.
///
/// Values only, no lookup indirection: whoever assembles the config has
/// already applied profiles and overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Minimum overlap for a parent/child match
    pub matching_threshold: f64,
    /// Overlap metric of the matching stage
    pub match_metric: MatchMetric,
    /// Single-axis IoU above which table boundaries count as duplicates
    pub removal_iou_threshold: f64,
    /// Equal-confidence duplicate resolution
    pub tie_policy: TiePolicy,
    /// Worker count for parallel stages
    pub num_workers: usize,
    /// Parent side of the matching stage
    pub parent_categories: Vec<Category>,
    /// Child side of the matching stage
    pub child_categories: Vec<Category>,
    /// Block categories ordered by the reading-order stage
    pub text_categories: Vec<Category>,
    /// Categories interleaved by vertical position instead of column flow
    pub floating_categories: Vec<Category>,
    /// Categories projected as page items by the parsing stage
    pub item_categories: Vec<Category>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            matching_threshold: 0.3,
            match_metric: MatchMetric::default(),
            removal_iou_threshold: 0.6,
            tie_policy: TiePolicy::default(),
            num_workers: 4,
            parent_categories: vec![
                Category::Text,
                Category::Title,
                Category::List,
                Category::Cell,
            ],
            child_categories: vec![Category::Word],
            text_categories: vec![
                Category::Text,
                Category::Title,
                Category::List,
                Category::Table,
            ],
            floating_categories: vec![Category::Figure, Category::Caption],
            item_categories: vec![
                Category::Text,
                Category::Title,
                Category::List,
                Category::Caption,
                Category::PageHeader,
                Category::PageFooter,
                Category::PageNumber,
            ],
        }
    }
}

/// Builds one component from a resolved configuration.
pub type ComponentFactory =
    Box<dyn Fn(&ComponentConfig) -> Result<Box<dyn PipelineComponent>> + Send + Sync>;

static REGISTRY: Lazy<RwLock<FxHashMap<String, ComponentFactory>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Register a factory under `tag`, replacing any previous occupant.
pub fn register(tag: impl Into<String>, factory: ComponentFactory) {
    let tag = tag.into();
    log::debug!("registry: registering component {tag}");
    if let Ok(mut registry) = REGISTRY.write() {
        registry.insert(tag, factory);
    }
}

/// Build the component registered under `tag`.
pub fn create(tag: &str, config: &ComponentConfig) -> Result<Box<dyn PipelineComponent>> {
    let registry = REGISTRY
        .read()
        .map_err(|_| PageflowError::worker("registry", "registry lock poisoned"))?;
    let factory = registry
        .get(tag)
        .ok_or_else(|| PageflowError::reference(format!("no component registered as {tag}")))?;
    factory(config)
}

/// Register the model-free built-in services.
///
/// Detector- and recognizer-backed services carry injected models and are
/// registered by the embedder with their models already bound.
pub fn register_builtin_components() {
    register(
        "matching",
        Box::new(|config: &ComponentConfig| {
            Ok(Box::new(MatchingService::new(
                config.parent_categories.clone(),
                config.child_categories.clone(),
                config.matching_threshold,
                config.match_metric,
            )) as Box<dyn PipelineComponent>)
        }),
    );
    register(
        "table_segmentation",
        Box::new(|config: &ComponentConfig| {
            Ok(Box::new(TableSegmentationService::new(
                config.removal_iou_threshold,
                config.tie_policy,
            )) as Box<dyn PipelineComponent>)
        }),
    );
    register(
        "text_order",
        Box::new(|config: &ComponentConfig| {
            Ok(Box::new(TextOrderService::new(
                config.text_categories.clone(),
                config.floating_categories.clone(),
            )) as Box<dyn PipelineComponent>)
        }),
    );
    register(
        "page_parsing",
        Box::new(|config: &ComponentConfig| {
            Ok(Box::new(PageParsingService::new(
                config.item_categories.clone(),
            )) as Box<dyn PipelineComponent>)
        }),
    );
}
