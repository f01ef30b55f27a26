use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use glam::Vec2;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cospace_common::Transform2d;
use cospace_doc::{Document, load_document, save_document};
use cospace_schema::ComponentRegistry;
use cospace_sync::{Projection, decode_document, export_world};
use cospace_world::components::{label_type, transform_type};
use cospace_world::{EcsWorld, Provenance, component};

#[derive(Parser)]
#[command(name = "cospace-cli", about = "CLI tool for cospace operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Run a scripted editing session against a fresh document
    Demo {
        /// Number of entities to create
        #[arg(short, long, default_value = "3")]
        entities: usize,
        /// Save the resulting document to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load a saved document and print its decoded contents
    Show {
        /// Document file written by `demo --out`
        file: PathBuf,
    },
    /// Demonstrate two replicas converging after disjoint edits
    Converge,
}

fn default_registry() -> Arc<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    registry
        .register(transform_type())
        .expect("transform registered once");
    registry
        .register(label_type())
        .expect("label registered once");
    Arc::new(registry)
}

fn fresh_replica() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("cospace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", cospace_common::crate_info());
            println!("schema: {}", cospace_schema::crate_info());
            println!("doc:    {}", cospace_doc::crate_info());
            println!("world:  {}", cospace_world::crate_info());
            println!("sync:   {}", cospace_sync::crate_info());
            println!("cache:  {}", cospace_cache::crate_info());
        }
        Commands::Demo { entities, out } => {
            let registry = default_registry();
            let world = Rc::new(RefCell::new(EcsWorld::new()));
            let doc = Rc::new(Document::new(fresh_replica()));
            let _proj =
                Projection::attach(Rc::clone(&world), Rc::clone(&doc), Arc::clone(&registry));

            let mut ids = Vec::new();
            for i in 0..entities {
                let id = world.borrow_mut().create_entity(
                    Provenance::Local,
                    [
                        component(
                            "transform",
                            Transform2d {
                                origin: Vec2::new(i as f32 * 2.0, 0.0),
                                orientation: Vec2::X,
                            },
                        ),
                        component("label", format!("entity {i}")),
                    ],
                );
                ids.push(id);
            }

            // Move the first entity after creation so the document sees an
            // update, not just inserts.
            if let Some(&first) = ids.first() {
                world.borrow_mut().set(
                    Provenance::Local,
                    first,
                    "transform",
                    Transform2d {
                        origin: Vec2::new(1.0, 2.0),
                        orientation: Vec2::X,
                    },
                )?;
            }

            let decoded = decode_document(&doc, &registry);
            println!("{}", serde_json::to_string_pretty(&decoded)?);
            let consistent = decoded == export_world(&world.borrow(), &registry);
            println!(
                "entities={} document consistency: {}",
                world.borrow().entity_count(),
                if consistent { "OK" } else { "MISMATCH" }
            );

            if let Some(path) = out {
                save_document(&doc, &path)?;
                println!("document saved to {}", path.display());
            }
        }
        Commands::Show { file } => {
            let registry = default_registry();
            let doc = load_document(&file, fresh_replica())?;
            let decoded = decode_document(&doc, &registry);
            println!("{}", serde_json::to_string_pretty(&decoded)?);
            println!("{} entities, {} live registers", decoded.len(), doc.live_len());
        }
        Commands::Converge => {
            let registry = default_registry();
            let world_a = Rc::new(RefCell::new(EcsWorld::new()));
            let doc_a = Rc::new(Document::new(1));
            let world_b = Rc::new(RefCell::new(EcsWorld::new()));
            let doc_b = Rc::new(Document::new(2));
            let _pa =
                Projection::attach(Rc::clone(&world_a), Rc::clone(&doc_a), Arc::clone(&registry));
            let _pb =
                Projection::attach(Rc::clone(&world_b), Rc::clone(&doc_b), Arc::clone(&registry));

            world_a.borrow_mut().create_entity(
                Provenance::Local,
                [
                    component("transform", Transform2d::default()),
                    component("label", "made by a".to_string()),
                ],
            );
            world_b.borrow_mut().create_entity(
                Provenance::Local,
                [component("label", "made by b".to_string())],
            );

            println!(
                "before merge: a={} entities, b={} entities",
                world_a.borrow().entity_count(),
                world_b.borrow().entity_count()
            );

            doc_a.apply_update(&doc_b.export());
            doc_b.apply_update(&doc_a.export());

            let a = export_world(&world_a.borrow(), &registry);
            let b = export_world(&world_b.borrow(), &registry);
            println!(
                "after merge:  a={} entities, b={} entities",
                a.len(),
                b.len()
            );
            println!("converged: {}", if a == b { "OK" } else { "MISMATCH" });
        }
    }

    Ok(())
}
