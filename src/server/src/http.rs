//! The HTTP facade: cube manipulation endpoints plus the comparison solve
//! that runs every available backend on the same captured state.
//!
//! Request handling is a pure function from (method, path, body) to a
//! status and JSON payload so it can be tested without sockets; the
//! `tiny_http` loop in [`run`] only does I/O and CORS plumbing.

use std::io::Read;
use std::time::Duration;

use cube::{Cube, Face, Move};
use log::{error, info};
use serde::Deserialize;
use serde_json::{Value, json};
use solver::{SolveOptions, Solver, SolverKind};
use tiny_http::{Header, Method, Response, Server};

/// Per-backend wall-clock budget for the comparison endpoint.
const SOLVE_BUDGET: Duration = Duration::from_secs(20);

const DEFAULT_SCRAMBLE_MOVES: usize = 20;

/// Facade state: the current cube, the selected backend and the backend
/// registry. Which backends exist is decided at startup; cluster and
/// hybrid are present only when a fabric was brought up.
pub struct App {
    cube: Cube,
    selected: SolverKind,
    backends: Vec<Solver>,
}

/// One handled request: a status code and an optional JSON body (empty for
/// CORS preflights).
pub struct Reply {
    pub status: u16,
    pub body: Option<Value>,
}

impl Reply {
    fn ok(body: Value) -> Reply {
        Reply {
            status: 200,
            body: Some(body),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Reply {
        Reply {
            status,
            body: Some(json!({ "error": message.into() })),
        }
    }
}

#[derive(Deserialize, Default)]
struct ScrambleBody {
    moves: Option<usize>,
}

#[derive(Deserialize)]
struct MoveBody {
    #[serde(rename = "move")]
    token: String,
}

#[derive(Deserialize)]
struct StateBody {
    state: String,
}

#[derive(Deserialize, Default)]
struct SolveBody {
    #[serde(rename = "maxDepth")]
    max_depth: Option<u32>,
}

#[derive(Deserialize)]
struct SelectBody {
    solver: String,
}

impl App {
    #[must_use]
    pub fn new(backends: Vec<Solver>) -> App {
        App {
            cube: Cube::solved(),
            selected: SolverKind::Sequential,
            backends,
        }
    }

    fn available(&self, kind: SolverKind) -> bool {
        self.backends.iter().any(|b| b.kind() == kind)
    }

    /// Route one request. Unknown paths are 404, unsupported methods 405.
    pub fn handle(&mut self, method: &Method, path: &str, body: &str) -> Reply {
        if *method == Method::Options {
            return Reply {
                status: 200,
                body: None,
            };
        }
        match (method, path) {
            (Method::Get, "/status") => Reply::ok(json!({
                "status": "running",
                "solver": self.selected.id(),
            })),
            (Method::Get, "/cube") => Reply::ok(cube_json(&self.cube)),
            (Method::Get, "/solvers") => Reply::ok(json!({
                "solvers": self.backends.iter().map(|b| b.kind().id()).collect::<Vec<_>>(),
                "current": self.selected.id(),
            })),
            (Method::Post, "/solver/select") => self.select_solver(body),
            (Method::Post, "/cube/reset") => {
                self.cube.reset();
                Reply::ok(cube_json(&self.cube))
            }
            (Method::Post, "/cube/scramble") => self.scramble(body),
            (Method::Post, "/cube/move") => self.apply_move(body),
            (Method::Post, "/cube/state") => self.set_state(body),
            (Method::Post, "/cube/solve") => self.solve_all(body),
            (Method::Get | Method::Post, _) => Reply::error(404, "not found"),
            _ => Reply::error(405, "method not allowed"),
        }
    }

    fn select_solver(&mut self, body: &str) -> Reply {
        let Some(request) = parse_body::<SelectBody>(body) else {
            return Reply::error(400, "solver not specified");
        };
        match SolverKind::from_id(&request.solver) {
            Some(kind) if self.available(kind) => {
                self.selected = kind;
                info!("selected solver {kind}");
                Reply::ok(json!({ "solver": kind.id() }))
            }
            Some(kind) => Reply::error(400, format!("solver {kind} is not available")),
            None => Reply::error(400, format!("unknown solver {:?}", request.solver)),
        }
    }

    fn scramble(&mut self, body: &str) -> Reply {
        let request = parse_body::<ScrambleBody>(body).unwrap_or_default();
        let count = request.moves.unwrap_or(DEFAULT_SCRAMBLE_MOVES);
        let applied = self.cube.scramble(count);
        info!(
            "scrambled with {}",
            applied
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );
        Reply::ok(cube_json(&self.cube))
    }

    fn apply_move(&mut self, body: &str) -> Reply {
        let Some(request) = parse_body::<MoveBody>(body) else {
            return Reply::error(400, "move not specified");
        };
        match request.token.parse::<Move>() {
            Ok(m) => {
                self.cube.apply(m);
                Reply::ok(cube_json(&self.cube))
            }
            Err(err) => Reply::error(400, err.to_string()),
        }
    }

    fn set_state(&mut self, body: &str) -> Reply {
        let Some(request) = parse_body::<StateBody>(body) else {
            return Reply::error(400, "state not specified");
        };
        match Cube::deserialize(&request.state) {
            Ok(cube) => {
                self.cube = cube;
                Reply::ok(cube_json(&self.cube))
            }
            Err(err) => Reply::error(400, err.to_string()),
        }
    }

    /// Run every available backend on the same captured state, each under
    /// its own wall-clock budget, and report the measured numbers.
    fn solve_all(&mut self, body: &str) -> Reply {
        let request = parse_body::<SolveBody>(body).unwrap_or_default();
        let options = SolveOptions {
            max_depth: request.max_depth.unwrap_or(solver::DEFAULT_MAX_DEPTH),
            budget: SOLVE_BUDGET,
        };
        let captured = self.cube.clone();

        let mut results = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            match backend.solve(&captured, &options) {
                Ok(report) => {
                    let moves: Vec<String> = report
                        .solution
                        .iter()
                        .flatten()
                        .map(ToString::to_string)
                        .collect();
                    results.push(json!({
                        "solver": backend.kind().id(),
                        "success": report.solved(),
                        "timeout": report.timed_out,
                        "solution": moves,
                        "moves": moves.len(),
                        "nodes": report.nodes,
                        "time": report.elapsed.as_secs_f64(),
                    }));
                }
                Err(err) => {
                    error!("{} backend failed: {err}", backend.kind());
                    return Reply::error(500, format!("{} backend failed: {err}", backend.kind()));
                }
            }
        }
        Reply::ok(json!({ "cube": cube_json(&self.cube), "results": results }))
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Option<T> {
    if body.trim().is_empty() {
        return None;
    }
    serde_json::from_str(body).ok()
}

fn cube_json(cube: &Cube) -> Value {
    let mut faces = serde_json::Map::new();
    for face in Face::ALL {
        faces.insert(
            face.letter().to_string(),
            cube.face(face)
                .iter()
                .map(|c| Value::String(c.as_char().to_string()))
                .collect(),
        );
    }
    json!({ "faces": faces, "isSolved": cube.is_solved() })
}

/// Serve the facade forever on `port`.
pub fn run(port: u16, mut app: App) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(("0.0.0.0", port))?;
    info!("listening on http://0.0.0.0:{port}/");

    for mut request in server.incoming_requests() {
        let mut body = String::new();
        let _ = request.as_reader().read_to_string(&mut body);
        let reply = app.handle(request.method(), request.url(), &body);

        let payload = reply.body.map(|v| v.to_string()).unwrap_or_default();
        let mut response = Response::from_string(payload).with_status_code(reply.status);
        for (name, value) in [
            ("Content-Type", "application/json"),
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
            ("Access-Control-Allow-Headers", "Content-Type"),
        ] {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }
        let _ = request.respond(response);
    }
    Ok(())
}
