#![allow(dead_code)]

use scenariodb::core::{EquType, ModelStatus, NativeError, NativeResult, SolveStatus, VarType};
use scenariodb::{
    Checkpoint, InMemoryRuntime, ModelProgram, SolveContext, Solver, SolverModel, Workspace,
    WorkspaceConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const PLANTS: [&str; 2] = ["seattle", "san-diego"];
pub const MARKETS: [&str; 3] = ["new-york", "chicago", "topeka"];

/// Two plants, three markets; demand is scaled by the scalar `bmult`.
pub fn transport_program() -> ModelProgram {
    ModelProgram::new()
        .set("i", &PLANTS)
        .set("j", &MARKETS)
        .parameter("a", &["i"], &[(&["seattle"], 350.0), (&["san-diego"], 600.0)])
        .parameter(
            "b",
            &["j"],
            &[(&["new-york"], 325.0), (&["chicago"], 300.0), (&["topeka"], 275.0)],
        )
        .parameter(
            "c",
            &["i", "j"],
            &[
                (&["seattle", "new-york"], 0.225),
                (&["seattle", "chicago"], 0.153),
                (&["seattle", "topeka"], 0.162),
                (&["san-diego", "new-york"], 0.225),
                (&["san-diego", "chicago"], 0.162),
                (&["san-diego", "topeka"], 0.126),
            ],
        )
        .scalar("bmult", 1.0)
        .variable("x", &["i", "j"], VarType::Positive)
        .variable("z", &[], VarType::Free)
        .equation("cost", &[], EquType::E)
        .equation("supply", &["i"], EquType::L)
        .equation("demand", &["j"], EquType::G)
        .model("transport", &["cost", "supply", "demand"])
}

/// Objective of the transport model for a feasible demand multiplier.
pub fn expected_cost(bmult: f64) -> f64 {
    153.675 * bmult
}

pub struct Fixture {
    pub dir: TempDir,
    pub workspace: Workspace,
    pub checkpoint: Checkpoint,
    pub runtime: Arc<InMemoryRuntime>,
}

pub fn transport_fixture() -> Fixture {
    transport_fixture_with(WorkspaceConfig::new())
}

/// Workspace in a fresh directory with the transport model saved in checkpoint `base`.
pub fn transport_fixture_with(config: WorkspaceConfig) -> Fixture {
    transport_fixture_on(InMemoryRuntime::new(), config)
}

pub fn transport_fixture_on(runtime: InMemoryRuntime, config: WorkspaceConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(runtime);
    runtime.register_solver("mincost", Arc::new(TransportSolver));
    runtime.set_default_solver("lp", "mincost");

    let workspace = Workspace::new(
        config
            .working_directory(dir.path())
            .runtime(runtime.clone()),
    )
    .unwrap();
    let checkpoint = workspace.add_checkpoint(Some("base")).unwrap();
    workspace
        .add_job_from_string(&transport_program().to_json().unwrap(), None, Some("data"))
        .unwrap()
        .run(None, Some(&checkpoint))
        .unwrap();
    Fixture {
        dir,
        workspace,
        checkpoint,
        runtime,
    }
}

// ============================================================================
// Solvers
// ============================================================================

const EPS: f64 = 1e-9;

struct Edge {
    to: usize,
    cap: f64,
    cost: f64,
    rev: usize,
}

/// Successive shortest paths with Bellman-Ford.
struct FlowNetwork {
    graph: Vec<Vec<Edge>>,
}

impl FlowNetwork {
    fn new(nodes: usize) -> Self {
        Self {
            graph: (0..nodes).map(|_| Vec::new()).collect(),
        }
    }

    /// Returns the position of the forward edge in `graph[from]`.
    fn add_edge(&mut self, from: usize, to: usize, cap: f64, cost: f64) -> usize {
        let forward = self.graph[from].len();
        let backward = self.graph[to].len();
        self.graph[from].push(Edge {
            to,
            cap,
            cost,
            rev: backward,
        });
        self.graph[to].push(Edge {
            to: from,
            cap: 0.0,
            cost: -cost,
            rev: forward,
        });
        forward
    }

    fn min_cost_flow(&mut self, source: usize, sink: usize) -> (f64, f64) {
        let n = self.graph.len();
        let (mut flow, mut cost) = (0.0, 0.0);
        loop {
            let mut dist = vec![f64::INFINITY; n];
            let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
            dist[source] = 0.0;
            for _ in 0..n {
                let mut changed = false;
                for u in 0..n {
                    if dist[u].is_infinite() {
                        continue;
                    }
                    for (k, e) in self.graph[u].iter().enumerate() {
                        if e.cap > EPS && dist[u] + e.cost < dist[e.to] - EPS {
                            dist[e.to] = dist[u] + e.cost;
                            prev[e.to] = Some((u, k));
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
            if dist[sink].is_infinite() {
                return (flow, cost);
            }

            let mut push = f64::INFINITY;
            let mut v = sink;
            while let Some((u, k)) = prev[v] {
                push = push.min(self.graph[u][k].cap);
                v = u;
            }
            let mut v = sink;
            while let Some((u, k)) = prev[v] {
                self.graph[u][k].cap -= push;
                let rev = self.graph[u][k].rev;
                self.graph[v][rev].cap += push;
                v = u;
            }
            flow += push;
            cost += push * dist[sink];
        }
    }
}

/// Least-cost transportation solver for `transport_program`. Honors the
/// bounds of `x`, so fixed shipments are routed first.
pub struct TransportSolver;

impl Solver for TransportSolver {
    fn solve(&self, model: &mut SolverModel, ctx: &mut SolveContext<'_>) -> NativeResult<()> {
        let plants = model.set_elements("i").unwrap_or_default().to_vec();
        let markets = model.set_elements("j").unwrap_or_default().to_vec();
        let bmult = model.scalar("bmult").unwrap_or(1.0);
        let _ = writeln!(ctx.log(), "transport: bmult = {}", bmult);

        let source = 0;
        let sink = 1 + plants.len() + markets.len();
        let mut network = FlowNetwork::new(sink + 1);
        let mut base_cost = 0.0;
        let mut supply_left = Vec::new();
        let mut demand_left = vec![0.0; markets.len()];
        let mut arcs = Vec::new();

        for (p, plant) in plants.iter().enumerate() {
            let mut capacity = model.parameter("a", &[plant.as_str()]).unwrap_or(0.0);
            for (m, market) in markets.iter().enumerate() {
                let levels = model
                    .levels("x", &[plant.as_str(), market.as_str()])
                    .copied()
                    .ok_or_else(|| NativeError::new(1, format!("x({},{}) missing", plant, market)))?;
                let unit_cost = model.parameter("c", &[plant.as_str(), market.as_str()]).unwrap_or(0.0);
                let lower = levels.lower.max(0.0);
                capacity -= lower;
                demand_left[m] -= lower;
                base_cost += lower * unit_cost;
                let room = (levels.upper - lower).max(0.0);
                let edge = network.add_edge(1 + p, 1 + plants.len() + m, room, unit_cost);
                arcs.push((p, m, lower, edge));
            }
            supply_left.push(capacity);
        }

        if supply_left.iter().any(|s| *s < -EPS) {
            model.set_status(ModelStatus::InfeasibleGlobal, SolveStatus::Normal);
            return Ok(());
        }

        let mut required = 0.0;
        for (m, market) in markets.iter().enumerate() {
            let need = (bmult * model.parameter("b", &[market.as_str()]).unwrap_or(0.0) + demand_left[m]).max(0.0);
            required += need;
            network.add_edge(1 + plants.len() + m, sink, need, 0.0);
        }
        for (p, capacity) in supply_left.iter().enumerate() {
            network.add_edge(source, 1 + p, *capacity, 0.0);
        }

        let (flow, cost) = network.min_cost_flow(source, sink);
        if flow < required - 1e-6 {
            let _ = writeln!(ctx.log(), "transport: infeasible, shipped {} of {}", flow, required);
            model.set_status(ModelStatus::InfeasibleGlobal, SolveStatus::Normal);
            return Ok(());
        }

        let mut shipped_from = vec![0.0; plants.len()];
        let mut shipped_to = vec![0.0; markets.len()];
        for (p, m, lower, edge) in arcs {
            let used = {
                let e = &network.graph[1 + p][edge];
                network.graph[e.to][e.rev].cap
            };
            let level = lower + used;
            shipped_from[p] += level;
            shipped_to[m] += level;
            model.set_level("x", &[plants[p].as_str(), markets[m].as_str()], level)?;
        }
        for (p, plant) in plants.iter().enumerate() {
            model.set_level("supply", &[plant.as_str()], shipped_from[p])?;
        }
        for (m, market) in markets.iter().enumerate() {
            model.set_level("demand", &[market.as_str()], shipped_to[m])?;
        }
        let objective = base_cost + cost;
        let z = model.objective().to_string();
        model.set_level(&z, &[], objective)?;
        let _ = writeln!(ctx.log(), "transport: optimal objective {:.4}", objective);
        model.set_status(ModelStatus::OptimalGlobal, SolveStatus::Normal);
        Ok(())
    }
}

/// Counts calls and reports an optimal solve without touching records.
#[derive(Default)]
pub struct CountingSolver {
    calls: AtomicUsize,
}

impl CountingSolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Solver for CountingSolver {
    fn solve(&self, model: &mut SolverModel, _ctx: &mut SolveContext<'_>) -> NativeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        model.set_status(ModelStatus::OptimalGlobal, SolveStatus::Normal);
        Ok(())
    }
}
