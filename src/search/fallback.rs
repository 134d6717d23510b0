// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Offline fallback content
//!
//! Topic-keyed collections of diagram images served when no credential can
//! reach the live provider. Paging over a collection wraps around forever;
//! the pagination layer decides when to stop asking.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeSet;

use super::types::{normalize_query, tokenize, ResultItem, FALLBACK_SCHEME};

const FALLBACK_IMAGE_BASE: &str = "https://assets.diagram-search.dev/fallback";
const GENERAL_COLLECTION: &str = "general";

/// (title, file slug, comma-separated tags)
type Template = (&'static str, &'static str, &'static str);

struct TopicDef {
    name: &'static str,
    keywords: &'static [&'static str],
    templates: &'static [Template],
}

const TOPICS: &[TopicDef] = &[
    TopicDef {
        name: "network",
        keywords: &["network", "topology", "lan", "wan", "router", "firewall", "cloud", "vpn"],
        templates: &[
            ("Star Network Topology Diagram", "star-topology", "network,topology,star"),
            ("Enterprise LAN Architecture", "enterprise-lan", "network,lan,architecture"),
            ("Cloud Network Infrastructure Overview", "cloud-infrastructure", "network,cloud,infrastructure"),
            ("Mesh Network Topology", "mesh-topology", "network,topology,mesh"),
            ("Firewall and DMZ Network Layout", "firewall-dmz", "network,security,firewall"),
            ("WAN Branch Office Connectivity", "wan-branch", "network,wan,routing"),
            ("Home Network Setup Diagram", "home-network", "network,router,wifi"),
            ("Data Center Network Design", "datacenter-network", "network,datacenter,switch"),
            ("VPN Site-to-Site Diagram", "site-to-site-vpn", "network,vpn,security"),
            ("OSI Model Layers Diagram", "osi-layers", "network,osi,protocol"),
        ],
    },
    TopicDef {
        name: "flowchart",
        keywords: &["flowchart", "flow", "decision", "algorithm", "workflow", "chart"],
        templates: &[
            ("Basic Decision Flowchart", "decision-flowchart", "flowchart,decision"),
            ("Login Process Flowchart", "login-flowchart", "flowchart,authentication"),
            ("Algorithm Flowchart Example", "algorithm-flowchart", "flowchart,algorithm"),
            ("Order Fulfillment Flowchart", "order-flowchart", "flowchart,ecommerce"),
            ("Swimlane Flowchart Template", "swimlane-flowchart", "flowchart,swimlane"),
            ("Troubleshooting Flowchart", "troubleshooting-flowchart", "flowchart,support"),
            ("Software Release Workflow", "release-workflow", "flowchart,workflow,software"),
            ("Approval Workflow Diagram", "approval-workflow", "flowchart,workflow,approval"),
            ("Loop and Condition Flowchart", "loop-flowchart", "flowchart,programming"),
            ("Customer Onboarding Flow", "onboarding-flow", "flowchart,customer"),
        ],
    },
    TopicDef {
        name: "entity-relation",
        keywords: &["er", "erd", "entity", "relationship", "database", "schema", "sql", "uml"],
        templates: &[
            ("Entity Relationship Diagram for Library System", "library-erd", "erd,database,entity"),
            ("E-commerce Database Schema", "ecommerce-schema", "database,schema,sql"),
            ("Hospital Management ER Diagram", "hospital-erd", "erd,entity,relationship"),
            ("University Database ER Model", "university-erd", "erd,database,education"),
            ("UML Class Diagram Example", "uml-class", "uml,class,database"),
            ("Normalized Relational Schema", "normalized-schema", "database,normalization,sql"),
            ("Inventory System ERD", "inventory-erd", "erd,inventory"),
            ("Social Network Data Model", "social-data-model", "database,schema,graph"),
            ("Banking System ER Diagram", "banking-erd", "erd,banking,entity"),
            ("Star Schema Data Warehouse", "star-schema", "database,warehouse,schema"),
        ],
    },
    TopicDef {
        name: "process",
        keywords: &["process", "bpmn", "pipeline", "lifecycle", "sequence", "steps", "stages"],
        templates: &[
            ("Business Process Model (BPMN)", "bpmn-model", "process,bpmn"),
            ("CI/CD Pipeline Diagram", "cicd-pipeline", "process,pipeline,devops"),
            ("Software Development Lifecycle", "sdlc", "process,lifecycle,software"),
            ("Sequence Diagram for API Call", "api-sequence", "process,sequence,api"),
            ("Manufacturing Process Steps", "manufacturing-process", "process,manufacturing"),
            ("Hiring Process Stages", "hiring-process", "process,hr"),
            ("Data Processing Pipeline", "data-pipeline", "process,pipeline,data"),
            ("Incident Response Process", "incident-response", "process,security"),
            ("Product Lifecycle Stages", "product-lifecycle", "process,lifecycle,product"),
            ("Value Stream Map", "value-stream", "process,lean"),
        ],
    },
    TopicDef {
        name: "education",
        keywords: &["education", "learning", "school", "student", "classroom", "lesson", "teaching", "tutorial"],
        templates: &[
            ("Mind Map for Study Planning", "study-mind-map", "education,mindmap,study"),
            ("Water Cycle Diagram for Students", "water-cycle", "education,science,students"),
            ("Classroom Concept Map", "concept-map", "education,classroom"),
            ("Lesson Plan Structure", "lesson-plan", "education,teaching"),
            ("Learning Pathway Diagram", "learning-pathway", "education,learning"),
            ("Venn Diagram Worksheet", "venn-worksheet", "education,venn"),
            ("Historical Timeline Chart", "history-timeline", "education,history,timeline"),
            ("Parts of Speech Diagram", "parts-of-speech", "education,language"),
            ("Fraction Visual Model", "fraction-model", "education,math"),
            ("Solar System Diagram", "solar-system", "education,astronomy"),
        ],
    },
    TopicDef {
        name: "engineering",
        keywords: &["engineering", "circuit", "electrical", "mechanical", "blueprint", "architecture", "system"],
        templates: &[
            ("Electrical Circuit Schematic", "circuit-schematic", "engineering,circuit,electrical"),
            ("Microservices Architecture Diagram", "microservices", "engineering,architecture,software"),
            ("Mechanical Gear Assembly", "gear-assembly", "engineering,mechanical"),
            ("System Block Diagram", "system-block", "engineering,system"),
            ("PLC Control Wiring Diagram", "plc-wiring", "engineering,electrical,control"),
            ("Building Floor Plan Blueprint", "floor-plan", "engineering,blueprint,architecture"),
            ("HVAC System Layout", "hvac-layout", "engineering,hvac"),
            ("Signal Processing Block Diagram", "signal-processing", "engineering,signal"),
            ("Software System Context Diagram", "system-context", "engineering,architecture,c4"),
            ("Hydraulic System Schematic", "hydraulic-schematic", "engineering,hydraulic"),
        ],
    },
    TopicDef {
        name: "business",
        keywords: &["business", "organization", "organizational", "org", "strategy", "swot", "marketing", "sales"],
        templates: &[
            ("Organizational Chart Template", "org-chart", "business,organization,hierarchy"),
            ("SWOT Analysis Diagram", "swot-analysis", "business,strategy,swot"),
            ("Sales Funnel Diagram", "sales-funnel", "business,sales,marketing"),
            ("Business Model Canvas", "business-model-canvas", "business,strategy"),
            ("Customer Journey Map", "customer-journey", "business,marketing,customer"),
            ("Project Gantt Chart", "gantt-chart", "business,project,timeline"),
            ("Stakeholder Map", "stakeholder-map", "business,management"),
            ("Porter's Five Forces", "five-forces", "business,strategy"),
            ("Marketing Strategy Roadmap", "marketing-roadmap", "business,marketing,roadmap"),
            ("Balanced Scorecard Diagram", "balanced-scorecard", "business,management,kpi"),
        ],
    },
    TopicDef {
        name: "science",
        keywords: &["science", "biology", "chemistry", "physics", "cell", "molecule", "experiment", "anatomy"],
        templates: &[
            ("Animal Cell Structure Diagram", "animal-cell", "science,biology,cell"),
            ("Periodic Table Overview", "periodic-table", "science,chemistry"),
            ("Photosynthesis Process Diagram", "photosynthesis", "science,biology,process"),
            ("Newton's Laws Illustration", "newtons-laws", "science,physics"),
            ("DNA Double Helix Structure", "dna-helix", "science,biology,genetics"),
            ("Chemical Bonding Diagram", "chemical-bonding", "science,chemistry,molecule"),
            ("Human Heart Anatomy", "heart-anatomy", "science,anatomy,biology"),
            ("Electromagnetic Spectrum Chart", "em-spectrum", "science,physics"),
            ("Scientific Method Steps", "scientific-method", "science,experiment"),
            ("Food Web Diagram", "food-web", "science,ecology"),
        ],
    },
];

/// A named, ordered set of offline results
#[derive(Debug, Clone)]
pub struct FallbackCollection {
    pub name: String,
    pub keywords: BTreeSet<String>,
    pub items: Vec<ResultItem>,
}

impl FallbackCollection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items for a 1-based page, wrapping around the end of the collection
    ///
    /// A page never holds more than one copy of any item, so it is capped at
    /// the collection size.
    pub fn page(&self, page_number: u32, page_size: usize) -> Vec<ResultItem> {
        let len = self.items.len();
        if len == 0 || page_size == 0 {
            return Vec::new();
        }
        let start = (page_number.max(1) as usize - 1).wrapping_mul(page_size) % len;
        (0..page_size.min(len))
            .map(|i| self.items[(start + i) % len].clone())
            .collect()
    }

    fn matches(&self, tokens: &[String]) -> bool {
        tokens.iter().any(|t| self.keywords.contains(t))
    }
}

/// Deterministic offline result source
pub struct FallbackProvider {
    collections: Vec<FallbackCollection>,
}

impl FallbackProvider {
    /// Provider with the built-in topic collections
    pub fn new() -> Self {
        let collections = TOPICS.iter().map(build_collection).collect();
        Self { collections }
    }

    /// Provider over custom collections, matched in the given order
    pub fn with_collections(collections: Vec<FallbackCollection>) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &[FallbackCollection] {
        &self.collections
    }

    /// Pick the collection for a query
    ///
    /// The first collection whose keywords intersect the query tokens wins.
    /// Otherwise every item is mixed into one collection, shuffled with a seed
    /// derived from the query so the same query always sees the same order.
    pub fn select(&self, query: &str) -> Cow<'_, FallbackCollection> {
        let tokens = tokenize(query);
        if let Some(found) = self.collections.iter().find(|c| c.matches(&tokens)) {
            return Cow::Borrowed(found);
        }

        let mut items: Vec<ResultItem> = self
            .collections
            .iter()
            .flat_map(|c| c.items.iter().cloned())
            .collect();
        let mut rng = StdRng::seed_from_u64(query_seed(query));
        items.shuffle(&mut rng);

        Cow::Owned(FallbackCollection {
            name: GENERAL_COLLECTION.to_string(),
            keywords: BTreeSet::new(),
            items,
        })
    }

    /// Fallback page for a query
    pub fn page_for(&self, query: &str, page_number: u32, page_size: usize) -> Vec<ResultItem> {
        self.select(query).page(page_number, page_size)
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn build_collection(topic: &TopicDef) -> FallbackCollection {
    let items = topic
        .templates
        .iter()
        .enumerate()
        .map(|(i, (title, slug, tags))| ResultItem {
            id: format!("fallback-{}-{}", topic.name, i + 1),
            title: title.to_string(),
            image_location: format!("{}/{}/{}.png", FALLBACK_IMAGE_BASE, topic.name, slug),
            author: None,
            tags: tags.split(',').map(str::to_string).collect(),
            source_location: Some(format!("{}{}", FALLBACK_SCHEME, topic.name)),
            is_generated: false,
            relevance_score: 0,
        })
        .collect();

    FallbackCollection {
        name: topic.name.to_string(),
        keywords: topic.keywords.iter().map(|k| k.to_string()).collect(),
        items,
    }
}

fn query_seed(query: &str) -> u64 {
    let digest = Sha256::digest(normalize_query(query).as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(seed)
}
