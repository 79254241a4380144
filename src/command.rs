//! Text command surface.
//!
//! Small verb + argument requests, as typed into a console or received over
//! a message channel. Parsing rejects malformed input before anything
//! reaches the graph.
//!
//! | Command                                        | Effect                         |
//! |------------------------------------------------|--------------------------------|
//! | `set <stat> <value>`                           | set a base value               |
//! | `get <stat>`                                   | read a stat                    |
//! | `stats`                                        | read every stat                |
//! | `tags`                                         | list active tags               |
//! | `tag add <name>` / `tag remove <name>`         | change the tag set             |
//! | `damage <amount> <type>`                       | record damage taken            |
//! | `crit` / `block` / `kill`                      | trigger a recently tracker     |
//! | `mod add <id> <target> <kind> <value> <source>`| add a modifier                 |
//! | `mod remove <id>`                              | remove a modifier              |
//! | `equip <id>`                                   | activate a registered producer |
//! | `aura <id>`                                    | toggle or restart an aura      |
//! | `unequip <source>`                             | drop everything from a source  |
//!
//! Verbs are case-insensitive; stat ids and tag names are not.

use crate::error::StatError;
use crate::manager::GraphManager;
use crate::modifier::{Modifier, ModifierKind};
use crate::producer::{CombatEvent, DamageType};
use crate::recently::RecentlyKind;
use crate::stat_id::StatId;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { stat: String, value: f64 },
    Get { stat: String },
    Stats,
    Tags,
    AddTag(String),
    RemoveTag(String),
    Damage { amount: f64, damage_type: DamageType },
    Trigger(RecentlyKind),
    AddModifier {
        id: String,
        target: String,
        kind: ModifierKind,
        value: f64,
        source: String,
    },
    RemoveModifier(String),
    Equip(String),
    Aura(String),
    Unequip(String),
}

fn invalid(usage: &str) -> StatError {
    StatError::InvalidCommand(format!("usage: {usage}"))
}

fn number(raw: &str, usage: &str) -> Result<f64, StatError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(usage))
}

impl FromStr for Command {
    type Err = StatError;

    /// # Examples
    ///
    /// ```rust
    /// use statgraph::command::Command;
    /// use statgraph::producer::DamageType;
    ///
    /// let cmd: Command = "DAMAGE 250 fire".parse().unwrap();
    /// assert_eq!(cmd, Command::Damage { amount: 250.0, damage_type: DamageType::Fire });
    ///
    /// assert!("set strength".parse::<Command>().is_err());
    /// ```
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = args.first() else {
            return Err(StatError::InvalidCommand("empty command".into()));
        };

        match (verb.to_ascii_lowercase().as_str(), &args[1..]) {
            ("set", [stat, value]) => Ok(Command::Set {
                stat: stat.to_string(),
                value: number(value, "set <stat> <value>")?,
            }),
            ("set", _) => Err(invalid("set <stat> <value>")),
            ("get", [stat]) => Ok(Command::Get {
                stat: stat.to_string(),
            }),
            ("get", _) => Err(invalid("get <stat>")),
            ("stats", []) => Ok(Command::Stats),
            ("tags", []) => Ok(Command::Tags),
            ("tag", [action, name]) => match action.to_ascii_lowercase().as_str() {
                "add" => Ok(Command::AddTag(name.to_string())),
                "remove" => Ok(Command::RemoveTag(name.to_string())),
                _ => Err(invalid("tag add|remove <name>")),
            },
            ("tag", _) => Err(invalid("tag add|remove <name>")),
            ("damage", [amount, kind]) => {
                let usage = "damage <amount> <physical|fire|cold|lightning|chaos>";
                Ok(Command::Damage {
                    amount: number(amount, usage)?,
                    damage_type: DamageType::from_str(kind).map_err(|_| invalid(usage))?,
                })
            }
            ("damage", _) => Err(invalid("damage <amount> <type>")),
            ("mod", [action, rest @ ..]) => match (action.to_ascii_lowercase().as_str(), rest) {
                ("add", [id, target, kind, value, source]) => {
                    let usage = "mod add <id> <target> <flat|increased|more|override> <value> <source>";
                    Ok(Command::AddModifier {
                        id: id.to_string(),
                        target: target.to_string(),
                        kind: ModifierKind::from_str(kind).map_err(|_| invalid(usage))?,
                        value: number(value, usage)?,
                        source: source.to_string(),
                    })
                }
                ("remove", [id]) => Ok(Command::RemoveModifier(id.to_string())),
                _ => Err(invalid("mod add <id> <target> <kind> <value> <source> | mod remove <id>")),
            },
            ("mod", _) => Err(invalid("mod add|remove ...")),
            ("equip", [id]) => Ok(Command::Equip(id.to_string())),
            ("equip", _) => Err(invalid("equip <id>")),
            ("aura", [id]) => Ok(Command::Aura(id.to_string())),
            ("aura", _) => Err(invalid("aura <id>")),
            ("unequip", [source]) => Ok(Command::Unequip(source.to_string())),
            ("unequip", _) => Err(invalid("unequip <source>")),
            (other, []) => match RecentlyKind::from_str(other) {
                Ok(kind) => Ok(Command::Trigger(kind)),
                Err(_) => Err(StatError::InvalidCommand(format!("unknown command: {other}"))),
            },
            (other, _) => Err(StatError::InvalidCommand(format!("unknown command: {other}"))),
        }
    }
}

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Value { stat: StatId, value: f64 },
    Stats(Vec<(StatId, f64)>),
    Tags(Vec<String>),
    Done(String),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Value { stat, value } => write!(f, "{stat} = {value:.2}"),
            CommandOutput::Stats(stats) => {
                for (i, (stat, value)) in stats.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{stat} = {value:.2}")?;
                }
                Ok(())
            }
            CommandOutput::Tags(tags) if tags.is_empty() => f.write_str("(no tags)"),
            CommandOutput::Tags(tags) => f.write_str(&tags.join(", ")),
            CommandOutput::Done(message) => f.write_str(message),
        }
    }
}

impl GraphManager {
    /// Run a parsed command against the graph.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutput, StatError> {
        tracing::debug!(?command, "executing command");
        match command {
            Command::Set { stat, value } => {
                self.set_node_value(&stat, value)?;
                Ok(CommandOutput::Done(format!("{stat} set to {value}")))
            }
            Command::Get { stat } => {
                let value = self.get_value(&stat)?;
                Ok(CommandOutput::Value {
                    stat: StatId::from(stat),
                    value,
                })
            }
            Command::Stats => {
                let mut stats = Vec::new();
                for id in self.node_ids() {
                    let value = self.get_value(id.as_str())?;
                    stats.push((id, value));
                }
                Ok(CommandOutput::Stats(stats))
            }
            Command::Tags => Ok(CommandOutput::Tags(self.tag_names())),
            Command::AddTag(name) => {
                let message = if self.add_tag(&name) {
                    format!("tag {name} added")
                } else {
                    format!("tag {name} already active")
                };
                Ok(CommandOutput::Done(message))
            }
            Command::RemoveTag(name) => {
                let message = if self.remove_tag(&name) {
                    format!("tag {name} removed")
                } else {
                    format!("tag {name} was not active")
                };
                Ok(CommandOutput::Done(message))
            }
            Command::Damage {
                amount,
                damage_type,
            } => {
                self.apply_combat_event(CombatEvent::TakeDamage {
                    amount,
                    damage_type,
                });
                Ok(CommandOutput::Done(format!("took {amount} {damage_type} damage")))
            }
            Command::Trigger(kind) => {
                let event = match kind {
                    RecentlyKind::Crit => CombatEvent::Crit,
                    RecentlyKind::Block => CombatEvent::Block,
                    RecentlyKind::Kill => CombatEvent::Kill,
                };
                self.apply_combat_event(event);
                Ok(CommandOutput::Done(format!("{kind} triggered")))
            }
            Command::AddModifier {
                id,
                target,
                kind,
                value,
                source,
            } => {
                if !self.contains(&target) {
                    return Err(StatError::NodeNotFound(StatId::from(target)));
                }
                let message = format!("modifier {id} added to {target}");
                self.add_modifier(Modifier::new(id, target, kind, value).with_source(source));
                Ok(CommandOutput::Done(message))
            }
            Command::RemoveModifier(id) => {
                self.remove_modifier(&id)?;
                Ok(CommandOutput::Done(format!("modifier {id} removed")))
            }
            Command::Equip(id) => {
                let (id, activated) = self.equip(&id)?;
                let message = if activated {
                    format!("{id} equipped")
                } else {
                    format!("{id} already equipped")
                };
                Ok(CommandOutput::Done(message))
            }
            Command::Aura(id) => {
                let (id, active) = self.toggle_aura(&id)?;
                let message = match (active, self.producer_remaining(&id)) {
                    (true, Some(left)) => format!("{id} active for {:.1}s", left.as_secs_f64()),
                    (true, None) => format!("{id} activated"),
                    (false, _) => format!("{id} deactivated"),
                };
                Ok(CommandOutput::Done(message))
            }
            Command::Unequip(source) => {
                if self.is_producer_active(&source) {
                    self.deactivate(&source)?;
                } else {
                    self.remove_modifiers_by_source(&source)?;
                }
                Ok(CommandOutput::Done(format!("{source} unequipped")))
            }
        }
    }

    /// Parse and run one line of input.
    pub fn execute_line(&mut self, line: &str) -> Result<CommandOutput, StatError> {
        let command = line.parse::<Command>()?;
        self.execute(command)
    }
}
