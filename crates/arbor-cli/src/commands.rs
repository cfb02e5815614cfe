use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Barrier;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use serde_json::json;

use arbor_repo::{
    Authority, BranchName, Grant, IndexQuery, NodePath, NodeType, PermissionLevel, RepoResult,
    Repository, RepositoryConfig, Transaction,
};

use crate::cli::*;

/// Dispatch a parsed command line.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Config(args) => cmd_config(&config, args, cli.format),
        Command::Scenario(args) => cmd_scenario(config, args, cli.format),
        Command::Stress(args) => cmd_stress(config, args, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RepositoryConfig> {
    match path {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(RepositoryConfig::default()),
    }
}

fn format_grants(grants: &BTreeSet<Grant>) -> Vec<String> {
    grants.iter().map(Grant::to_string).collect()
}

fn cmd_config(config: &RepositoryConfig, args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }
    if args.toml {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }
    println!("Default branch: {}", config.default_branch.as_str().yellow().bold());
    println!("Transactions:");
    println!("  max retries: {}", config.transaction.max_retries.to_string().bold());
    println!(
        "  backoff: {}ms doubling, capped at {}ms",
        config.transaction.backoff_base_ms, config.transaction.backoff_max_ms
    );
    println!("Index:");
    println!("  shards: {}", config.index.effective_shard_count().to_string().bold());
    Ok(())
}

// ---- scenario ----

/// One permission edit committed concurrently with the document writer.
struct AclChange {
    path: NodePath,
    remove: Option<Authority>,
    grant: Option<(Authority, PermissionLevel)>,
    inherit: Option<bool>,
}

impl AclChange {
    fn apply(&self, txn: &mut Transaction) -> RepoResult<()> {
        if let Some(authority) = &self.remove {
            txn.remove_permission(&self.path, authority.clone())?;
        }
        if let Some((authority, level)) = &self.grant {
            txn.set_permission(&self.path, authority.clone(), *level)?;
        }
        if let Some(inherit) = self.inherit {
            txn.set_inheritance(&self.path, inherit)?;
        }
        Ok(())
    }
}

struct ScenarioPlan {
    target: NodePath,
    changes: Vec<AclChange>,
    expected: BTreeSet<Grant>,
}

fn level_path(depth: usize) -> anyhow::Result<NodePath> {
    let mut path = NodePath::root();
    for level in 1..=depth {
        path = path.join(&format!("Level{level}"))?;
    }
    Ok(path)
}

/// Build the starting tree for `variant` and describe the concurrent edits.
fn prepare_scenario(
    repo: &Repository,
    branch: &BranchName,
    variant: ScenarioVariant,
) -> anyhow::Result<ScenarioPlan> {
    let x = Authority::group("X")?;
    let y = Authority::group("Y")?;
    let z = Authority::group("Z")?;
    let depth = if variant == ScenarioVariant::Deep { 5 } else { 2 };
    let level1 = level_path(1)?;
    let level2 = level_path(2)?;
    let with_x = if variant == ScenarioVariant::Deep { &level1 } else { &level2 };

    repo.run_transaction(branch, false, |txn| {
        let mut parent = NodePath::root();
        for level in 1..=depth {
            let name = format!("Level{level}");
            txn.create_folder(&parent, &name)?;
            parent = parent.join(&name)?;
        }
        txn.set_inheritance(&level1, false)?;
        if variant != ScenarioVariant::Deep {
            txn.set_inheritance(&level2, false)?;
        }
        txn.set_permission(with_x, x.clone(), PermissionLevel::Contributor)?;
        if variant == ScenarioVariant::Folder {
            txn.create_folder(&level2, "A")?;
        }
        Ok(())
    })?;

    let plan = match variant {
        ScenarioVariant::Folder => ScenarioPlan {
            target: level2.join("A")?,
            changes: vec![AclChange {
                path: level2.join("A")?,
                remove: None,
                grant: Some((y.clone(), PermissionLevel::Coordinator)),
                inherit: Some(false),
            }],
            expected: [Grant::new(y, PermissionLevel::Coordinator)].into_iter().collect(),
        },
        ScenarioVariant::Deep => ScenarioPlan {
            target: level_path(5)?,
            changes: vec![AclChange {
                path: level1,
                remove: Some(x),
                grant: Some((y.clone(), PermissionLevel::Coordinator)),
                inherit: None,
            }],
            expected: [Grant::new(y, PermissionLevel::Coordinator)].into_iter().collect(),
        },
        ScenarioVariant::TwoLevels => ScenarioPlan {
            target: level2.clone(),
            changes: vec![
                AclChange {
                    path: level1,
                    remove: None,
                    grant: Some((y.clone(), PermissionLevel::Coordinator)),
                    inherit: None,
                },
                AclChange {
                    path: level2,
                    remove: Some(x),
                    grant: Some((z.clone(), PermissionLevel::Editor)),
                    inherit: Some(true),
                },
            ],
            expected: [
                Grant::new(y, PermissionLevel::Coordinator),
                Grant::new(z, PermissionLevel::Editor),
            ]
            .into_iter()
            .collect(),
        },
    };
    Ok(plan)
}

fn cmd_scenario(config: RepositoryConfig, args: ScenarioArgs, format: OutputFormat) -> anyhow::Result<()> {
    let repo = Repository::new(config)?;
    let branch = repo.default_branch().clone();
    let plan = prepare_scenario(&repo, &branch, args.variant)?;
    tracing::info!(variant = ?args.variant, documents = args.documents, target = %plan.target, "scenario start");

    let started = Instant::now();
    std::thread::scope(|s| -> anyhow::Result<()> {
        let (repo, branch, plan) = (&repo, &branch, &plan);
        let mut handles = vec![s.spawn(move || -> RepoResult<()> {
            for i in 0..args.documents {
                repo.create_file(branch, &plan.target, &format!("doc-{i:03}"), b"content")?;
            }
            Ok(())
        })];
        for change in &plan.changes {
            handles.push(s.spawn(move || repo.run_transaction(branch, false, |txn| change.apply(txn))));
        }
        for handle in handles {
            handle.join().map_err(|_| anyhow!("scenario thread panicked"))??;
        }
        Ok(())
    })?;
    let elapsed = started.elapsed();

    let indexed: Vec<_> = repo
        .query(
            &IndexQuery::all()
                .branch(branch.clone())
                .under(plan.target.clone())
                .kind(NodeType::File),
        )?
        .into_iter()
        .filter(|doc| doc.path.parent().as_ref() == Some(&plan.target))
        .collect();

    let mut rows = Vec::new();
    let mut failures = 0;
    for doc in &indexed {
        let effective = repo.effective_permissions(&branch, &doc.path)?.grants;
        let ok = effective == plan.expected && doc.readers == plan.expected;
        if !ok {
            failures += 1;
        }
        rows.push((doc.path.to_string(), effective, doc.readers.clone(), ok));
    }
    let missing = args.documents.saturating_sub(indexed.len());

    match format {
        OutputFormat::Json => {
            let documents: Vec<_> = rows
                .iter()
                .map(|(path, effective, readers, ok)| {
                    json!({
                        "path": path,
                        "effective": format_grants(effective),
                        "indexed": format_grants(readers),
                        "ok": ok,
                    })
                })
                .collect();
            let report = json!({
                "variant": format!("{:?}", args.variant),
                "expected": format_grants(&plan.expected),
                "documents": documents,
                "missing": missing,
                "failures": failures,
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "Scenario {} on {} ({} documents, {:.1?})",
                format!("{:?}", args.variant).cyan().bold(),
                plan.target.to_string().bold(),
                indexed.len(),
                elapsed
            );
            println!("Expected: {}", format_grants(&plan.expected).join(", ").yellow());
            for (path, effective, _, ok) in &rows {
                let mark = if *ok { "✓".green() } else { "✗".red().bold() };
                println!("  {} {}  {}", mark, path, format_grants(effective).join(", "));
            }
        }
    }

    if missing > 0 {
        bail!("{missing} documents missing from the index");
    }
    if failures > 0 {
        bail!("{failures} of {} documents have unexpected permissions", rows.len());
    }
    if format == OutputFormat::Text {
        println!("{} every document carries the expected permissions", "✓".green().bold());
    }
    Ok(())
}

// ---- stress ----

fn cmd_stress(config: RepositoryConfig, args: StressArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    let repo = Repository::new(config)?;
    let branch = repo.default_branch().clone();
    let dir = NodePath::parse("/stress")?;
    repo.create_folder(&branch, &NodePath::root(), "stress")?;

    let barrier = Barrier::new(args.threads);
    let started = Instant::now();
    let per_thread = std::thread::scope(|s| -> anyhow::Result<Vec<(usize, usize)>> {
        let handles: Vec<_> = (0..args.threads)
            .map(|t| {
                let (repo, branch, dir, barrier) = (&repo, &branch, &dir, &barrier);
                s.spawn(move || -> RepoResult<(usize, usize)> {
                    barrier.wait();
                    let (mut created, mut duplicates) = (0, 0);
                    for i in 0..args.names {
                        let content = format!("written by thread {t}");
                        match repo.create_file(branch, dir, &format!("n-{i:04}"), content.as_bytes()) {
                            Ok(_) => created += 1,
                            Err(e) if e.is_duplicate_name() => duplicates += 1,
                            Err(e) => return Err(e),
                        }
                    }
                    Ok((created, duplicates))
                })
            })
            .collect();
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.join().map_err(|_| anyhow!("stress thread panicked"))??);
        }
        Ok(out)
    })?;
    let elapsed = started.elapsed();

    let created: usize = per_thread.iter().map(|(c, _)| c).sum();
    let duplicates: usize = per_thread.iter().map(|(_, d)| d).sum();
    let listed = repo.list_children(&branch, &dir)?.len();
    let indexed = repo
        .query(&IndexQuery::all().branch(branch.clone()).under(dir.clone()).kind(NodeType::File))?
        .len();
    let stats = repo.index_stats()?;

    match format {
        OutputFormat::Json => {
            let report = json!({
                "threads": args.threads,
                "names": args.names,
                "created": created,
                "duplicates": duplicates,
                "listed": listed,
                "indexed": indexed,
                "index_commits": stats.commits,
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "{} threads x {} names in {:.1?}",
                args.threads.to_string().bold(),
                args.names.to_string().bold(),
                elapsed
            );
            println!("  created:    {}", created.to_string().green());
            println!("  duplicates: {}", duplicates.to_string().yellow());
            println!("  listed:     {listed}");
            println!("  indexed:    {indexed}");
            println!("  index commits: {}", stats.commits);
        }
    }

    if created != args.names || listed != args.names || indexed != args.names {
        bail!(
            "expected {} names, created {created}, listed {listed}, indexed {indexed}",
            args.names
        );
    }
    Ok(())
}
