// dot.rs — GraphViz rendering of a project graph.

use std::io::{self, Write};
use std::sync::Arc;

use attain_core::{Project, UpdateActions};

/// Writes a project graph in GraphViz DOT format: record-shaped goal
/// nodes, rounded boxes for real actions, bare "implicit" labels for
/// implicit ones. Abstract goals are dashed, leaves and roots bold;
/// goals with several producing actions carry their update-mode marker
/// and ordered in-edges are numbered.
pub struct Diagrammer {
    pub rank_dir: String,
}

impl Default for Diagrammer {
    fn default() -> Self {
        Diagrammer {
            rank_dir: "LR".to_string(),
        }
    }
}

fn esc(id: &str) -> String {
    id.replace('"', "\\\"")
}

impl Diagrammer {
    pub fn write_dot(&self, out: &mut impl Write, prj: &Arc<Project>) -> io::Result<()> {
        writeln!(out, "digraph \"{}\" {{", esc(&prj.label()))?;
        writeln!(out, "\trankdir=\"{}\"", self.rank_dir)?;
        for goal in prj.goals() {
            let in_edges = goal.result_of();
            let mode_mark = if in_edges.len() > 1 {
                match goal.update_mode().actions() {
                    UpdateActions::One => " 1",
                    UpdateActions::Any => " ?",
                    UpdateActions::Some => " +",
                    UpdateActions::All => " *",
                }
            } else {
                ""
            };
            let fringe = in_edges.is_empty() || goal.premise_of().is_empty();
            let style = match (goal.is_abstract(), fringe) {
                (true, true) => ",style=\"dashed,bold\"",
                (true, false) => ",style=dashed",
                (false, true) => ",style=bold",
                (false, false) => "",
            };
            writeln!(
                out,
                "\t\"g{}\" [shape=record{},label=\"{{{}{}|{}}}\"];",
                goal.id().index(),
                style,
                goal.kind(),
                mode_mark,
                esc(&goal.name()),
            )?;
            for (i, act) in in_edges.iter().enumerate() {
                if act.is_implicit() {
                    writeln!(
                        out,
                        "\t\"a{}\" [shape=none,label=\"implicit\"];",
                        act.id().index()
                    )?;
                } else if act.premises().is_empty() {
                    writeln!(
                        out,
                        "\t\"a{}\" [shape=box,style=\"rounded,bold\",label=\"{}\"];",
                        act.id().index(),
                        esc(&act.to_string()),
                    )?;
                } else {
                    writeln!(
                        out,
                        "\t\"a{}\" [shape=box,style=rounded,label=\"{}\"];",
                        act.id().index(),
                        esc(&act.to_string()),
                    )?;
                }
                let order = if goal.update_mode().ordered() {
                    format!(" [label={}]", i + 1)
                } else {
                    String::new()
                };
                writeln!(
                    out,
                    "\t\"a{}\" -> \"g{}\"{};",
                    act.id().index(),
                    goal.id().index(),
                    order
                )?;
            }
        }
        for act in prj.actions() {
            for pre in act.premises() {
                writeln!(
                    out,
                    "\t\"g{}\" -> \"a{}\";",
                    pre.id().index(),
                    act.id().index()
                )?;
            }
        }
        writeln!(out, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use attain_core::{Abstract, FnOp, Project, UpdateMode};

    #[test]
    fn renders_goals_actions_and_edges() {
        let prj = Project::new("demo");
        let src = prj.goal(Abstract::new("src")).unwrap();
        let mid = prj.goal(Abstract::new("mid")).unwrap();
        let out_goal = prj.goal(Abstract::new("out")).unwrap();
        prj.new_action(&[src.clone()], &[mid.clone()], None).unwrap();
        let op = Arc::new(FnOp::new("mash", |_, _, _| Ok(())));
        prj.new_action(&[mid.clone()], &[out_goal.clone()], Some(op.clone()))
            .unwrap();
        prj.new_action(&[src], &[out_goal.clone()], Some(op)).unwrap();
        out_goal.set_update_mode(UpdateMode::ANY_ACTION);

        let mut buf = Vec::new();
        Diagrammer::default().write_dot(&mut buf, &prj).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("digraph \"demo\" {"), "got: {text}");
        assert!(text.contains("rankdir=\"LR\""));
        assert!(text.contains("label=\"implicit\""));
        assert!(text.contains("label=\"mash\""));
        // two producing actions with Any mode show the '?' marker
        assert!(text.contains("{abstract ?|out}"), "got: {text}");
        // premise edges point from goals into actions
        assert!(text.contains("\"g0\" -> \"a0\";"));
        assert!(text.trim_end().ends_with('}'));
    }
}
