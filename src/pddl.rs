//! PDDL text emission for declared domains and learned action libraries.
//!
//! The textual dump is the only persisted form of a library. Learned libraries
//! are untyped: their `(:predicates ...)` block is gathered from the atom
//! signatures of the actions.

use std::collections::BTreeSet;
use std::fmt;

use crate::action::Action;
use crate::domain::Domain;
use crate::model::{Atom, LabeledAtom, Object, Section};

fn write_conjunction(f: &mut fmt::Formatter<'_>, atoms: &[String]) -> fmt::Result {
    f.write_str("(and")?;
    for atom in atoms {
        write!(f, " {atom}")?;
    }
    f.write_str(")")
}

/// One `(:action ...)` block.
///
/// Uncertain atoms are kept only when `include_uncertain` is set. `typing`
/// controls whether parameters are followed by ` - type`.
#[derive(Debug, Clone, Copy)]
pub struct ActionBlock<'a> {
    pub action: &'a Action,
    pub include_uncertain: bool,
    pub typing: bool,
}

impl ActionBlock<'_> {
    fn section(&self, section: Section) -> Vec<String> {
        self.action
            .sorted_atoms(section)
            .into_iter()
            .filter(|l: &&LabeledAtom| l.certain || self.include_uncertain)
            .map(|l| l.atom.to_pddl(false))
            .collect()
    }
}

impl fmt::Display for ActionBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pre = self.section(Section::Pre);
        let mut effect = self.section(Section::Add);
        effect.extend(self.section(Section::Del).into_iter().map(|a| format!("(not {a})")));

        write!(f, "(:action {}", self.action.name())?;
        let parameters = self.action.parameters();
        if !parameters.is_empty() {
            f.write_str("\n :parameters (")?;
            for (i, param) in parameters.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                f.write_str(&param.to_pddl(self.typing))?;
            }
            f.write_str(")")?;
        }
        if !pre.is_empty() {
            f.write_str("\n :precondition ")?;
            write_conjunction(f, &pre)?;
        }
        if !effect.is_empty() {
            f.write_str("\n :effect ")?;
            write_conjunction(f, &effect)?;
        }
        f.write_str("\n)")
    }
}

/// Render one action block.
pub fn action_to_pddl(action: &Action, include_uncertain: bool, typing: bool) -> String {
    ActionBlock {
        action,
        include_uncertain,
        typing,
    }
    .to_string()
}

/// `(head ?x0 ?x1 ...)` for an untyped signature.
fn generic_predicate(head: &str, arity: usize) -> String {
    let args = (0..arity).map(|i| Object::untyped(format!("?x{i}"))).collect();
    Atom::new(head, args).to_pddl(false)
}

/// A learned library as an untyped STRIPS domain.
#[derive(Debug, Clone)]
pub struct LibraryDomain<'a> {
    pub name: &'a str,
    pub actions: Vec<&'a Action>,
}

impl fmt::Display for LibraryDomain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signatures: BTreeSet<(&str, usize)> = self
            .actions
            .iter()
            .flat_map(|a| a.atoms())
            .map(|l| l.atom.signature())
            .collect();

        writeln!(f, "(define (domain {})\n", self.name)?;
        writeln!(f, "(:requirements :strips)\n")?;
        writeln!(f, "(:predicates")?;
        for (head, arity) in signatures {
            writeln!(f, "{}", generic_predicate(head, arity))?;
        }
        f.write_str(")")?;
        for action in &self.actions {
            write!(f, "\n\n{}", action_to_pddl(action, true, false))?;
        }
        f.write_str("\n)\n")
    }
}

/// Render a learned library as an untyped STRIPS domain.
pub fn library_to_pddl<'a>(domain_name: &'a str, actions: impl IntoIterator<Item = &'a Action>) -> String {
    LibraryDomain {
        name: domain_name,
        actions: actions.into_iter().collect(),
    }
    .to_string()
}

/// A declared domain. `:typing` is required as soon as the domain declares a
/// type.
#[derive(Debug, Clone, Copy)]
pub struct DeclaredDomain<'a>(pub &'a Domain);

impl fmt::Display for DeclaredDomain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domain = self.0;
        let typing = !domain.types().is_empty();
        writeln!(f, "(define (domain {})\n", domain.name())?;
        if typing {
            writeln!(f, "(:requirements :strips :typing)\n")?;
            writeln!(f, "(:types")?;
            for ty in domain.types() {
                let parent = ty.parent().map_or("object", |p| p.name());
                writeln!(f, "  {} - {}", ty.name(), parent)?;
            }
            writeln!(f, ")\n")?;
        } else {
            writeln!(f, "(:requirements :strips)\n")?;
        }
        writeln!(f, "(:predicates")?;
        for predicate in domain.predicates() {
            writeln!(f, "{}", predicate.to_pddl(typing))?;
        }
        writeln!(f, ")\n")?;
        for action in domain.actions() {
            writeln!(f, "{}\n", action_to_pddl(action, true, typing))?;
        }
        f.write_str(")\n")
    }
}

/// Render a declared domain.
pub fn domain_to_pddl(domain: &Domain) -> String {
    DeclaredDomain(domain).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Context, ObjType};

    fn obj(name: &str) -> Object {
        Object::untyped(name)
    }

    fn p(head: &str, args: &[&str]) -> Atom {
        Atom::new(head, args.iter().map(|a| obj(a)).collect())
    }

    fn lifted_move() -> Action {
        Action::new(
            "move",
            vec![
                LabeledAtom::pre(p("at", &["?r", "?from"])),
                LabeledAtom::pre(p("wet", &["?from"])).uncertain(),
                LabeledAtom::add(p("at", &["?r", "?to"])),
                LabeledAtom::del(p("at", &["?r", "?from"])),
            ],
        )
    }

    #[test]
    fn action_block_layout() {
        let text = action_to_pddl(&lifted_move(), true, false);
        assert_eq!(
            text,
            "(:action move\n \
             :parameters (?from ?r ?to)\n \
             :precondition (and (at ?r ?from) (wet ?from))\n \
             :effect (and (at ?r ?to) (not (at ?r ?from)))\n\
             )"
        );
    }

    #[test]
    fn action_block_formats_in_place() {
        let action = lifted_move();
        let block = ActionBlock {
            action: &action,
            include_uncertain: false,
            typing: false,
        };
        let text = format!("{block}\n");
        assert_eq!(text, format!("{}\n", action_to_pddl(&action, false, false)));
        assert!(text.ends_with("(not (at ?r ?from)))\n)\n"));
    }

    #[test]
    fn uncertain_atoms_can_be_omitted() {
        let text = action_to_pddl(&lifted_move(), false, false);
        assert!(!text.contains("wet"));
        assert!(text.contains(":precondition (and (at ?r ?from))"));
    }

    #[test]
    fn empty_sections_are_skipped() {
        let pre = Context::from_atoms([p("on", &["a", "b"])]);
        let action = Action::from_transition("noop", &pre, &pre);
        let text = action_to_pddl(&action, true, false);
        assert!(!text.contains(":parameters"));
        assert!(!text.contains(":effect"));
    }

    #[test]
    fn library_predicates_come_from_signatures() {
        let text = library_to_pddl("learned", [&lifted_move()]);
        assert!(text.starts_with("(define (domain learned)"));
        assert!(text.contains("(:predicates\n(at ?x0 ?x1)\n(wet ?x0)\n)"));
        assert!(text.contains("(:action move"));
        assert!(text.trim_end().ends_with(')'));
    }

    #[test]
    fn typed_parameters() {
        let robot = ObjType::with_root_parent("robot");
        let action = Action::new(
            "charge",
            vec![LabeledAtom::add(Atom::new("charged", vec![robot.object("?r")]))],
        );
        let text = action_to_pddl(&action, true, true);
        assert!(text.contains(":parameters (?r - robot)"));
    }
}
