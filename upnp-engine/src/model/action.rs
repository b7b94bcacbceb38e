use std::sync::Arc;

use tracing::warn;

use crate::error::{ActionError, ErrorCode, ValidationError};
use crate::logging::VIOLATION_TARGET;
use crate::model::{Service, StateVariable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// A formal argument of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArgument {
    pub name: String,
    /// Alternative names accepted when matching messages
    pub aliases: Vec<String>,
    pub related_state_variable: String,
    pub direction: Direction,
    pub return_value: bool,
}

impl ActionArgument {
    pub fn input(name: impl Into<String>, related_state_variable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            related_state_variable: related_state_variable.into(),
            direction: Direction::In,
            return_value: false,
        }
    }

    pub fn output(name: impl Into<String>, related_state_variable: impl Into<String>) -> Self {
        Self {
            direction: Direction::Out,
            ..Self::input(name, related_state_variable)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn as_return_value(mut self) -> Self {
        self.return_value = true;
        self
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// An action of a service.
///
/// Construction normalizes the return-value flag: at most one argument keeps
/// it, and only if it is the first output argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    arguments: Vec<ActionArgument>,
}

impl Action {
    pub fn new(name: impl Into<String>, mut arguments: Vec<ActionArgument>) -> Self {
        let name = name.into();
        let first_output = arguments.iter().position(|a| a.direction == Direction::Out);
        let mut seen_return_value = false;

        for (index, argument) in arguments.iter_mut().enumerate() {
            if !argument.return_value {
                continue;
            }
            let reason = if argument.direction == Direction::In {
                Some("input argument")
            } else if seen_return_value {
                Some("second return value")
            } else if Some(index) != first_output {
                Some("not the first output argument")
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    warn!(
                        target: VIOLATION_TARGET,
                        action = %name,
                        argument = %argument.name,
                        "Return value flag on {}, clearing it",
                        reason
                    );
                    argument.return_value = false;
                }
                None => seen_return_value = true,
            }
        }

        Self { name, arguments }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[ActionArgument] {
        &self.arguments
    }

    pub fn input_arguments(&self) -> impl Iterator<Item = &ActionArgument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::In)
    }

    pub fn output_arguments(&self) -> impl Iterator<Item = &ActionArgument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::Out)
    }

    /// Argument called `name`, by name or alias.
    pub fn argument(&self, name: &str) -> Option<&ActionArgument> {
        self.arguments.iter().find(|a| a.is_named(name))
    }

    pub fn return_value(&self) -> Option<&ActionArgument> {
        self.arguments.iter().find(|a| a.return_value)
    }

    pub(crate) fn validate(&self, state_variables: &[StateVariable], errors: &mut Vec<ValidationError>) {
        let element = format!("Action({})", self.name);
        if self.name.is_empty() {
            errors.push(ValidationError::new(element.clone(), "name is empty"));
        }
        for argument in &self.arguments {
            if argument.name.is_empty() {
                errors.push(ValidationError::new(element.clone(), "argument name is empty"));
            }
            if !state_variables
                .iter()
                .any(|v| v.name == argument.related_state_variable)
            {
                errors.push(ValidationError::new(
                    element.clone(),
                    format!(
                        "argument {} references unknown state variable {}",
                        argument.name, argument.related_state_variable
                    ),
                ));
            }
        }
        let mut names: Vec<&str> = self.arguments.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::new(element, "duplicate argument names"));
        }
    }
}

/// One execution of an action: typed inputs in, typed outputs or a failure out.
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    service: Arc<Service>,
    action: Action,
    input: Vec<(String, Value)>,
    output: Vec<(String, Value)>,
}

impl ActionInvocation {
    /// Prepare an invocation of `action_name` on `service`.
    pub fn new(service: Arc<Service>, action_name: &str) -> Result<Self, ActionError> {
        let action = service.action(action_name).cloned().ok_or_else(|| {
            ActionError::new(
                ErrorCode::InvalidAction,
                format!("Service {} has no action {}", service.service_id, action_name),
            )
        })?;
        Ok(Self {
            service,
            action,
            input: Vec::new(),
            output: Vec::new(),
        })
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Set an input argument, checking the value against its state variable.
    pub fn set_input(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ActionError> {
        let value = value.into();
        let argument = self.checked_argument(name, Direction::In, &value)?;
        upsert(&mut self.input, argument, value);
        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        lookup(&self.action, &self.input, name)
    }

    /// Set an output argument, checking the value against its state variable.
    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ActionError> {
        let value = value.into();
        let argument = self.checked_argument(name, Direction::Out, &value)?;
        upsert(&mut self.output, argument, value);
        Ok(())
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        lookup(&self.action, &self.output, name)
    }

    /// Output values in declared order.
    pub fn outputs(&self) -> &[(String, Value)] {
        &self.output
    }

    /// Input values in declared order.
    pub fn inputs(&self) -> &[(String, Value)] {
        &self.input
    }

    /// Wire values of `direction` arguments in declared order; unset
    /// arguments are written empty.
    pub(crate) fn wire_values(&self, direction: Direction) -> Vec<(String, String)> {
        let values = match direction {
            Direction::In => &self.input,
            Direction::Out => &self.output,
        };
        self.action
            .arguments()
            .iter()
            .filter(|a| a.direction == direction)
            .map(|a| {
                let value = values
                    .iter()
                    .find(|(n, _)| *n == a.name)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                (a.name.clone(), value)
            })
            .collect()
    }

    /// Replace values wholesale after matching a message against the action.
    pub(crate) fn set_matched(&mut self, direction: Direction, values: Vec<(String, Value)>) {
        match direction {
            Direction::In => self.input = values,
            Direction::Out => self.output = values,
        }
    }

    fn checked_argument(
        &self,
        name: &str,
        direction: Direction,
        value: &Value,
    ) -> Result<String, ActionError> {
        let argument = self
            .action
            .argument(name)
            .filter(|a| a.direction == direction)
            .ok_or_else(|| {
                ActionError::new(
                    ErrorCode::InvalidArgs,
                    format!("Action {} has no {:?} argument {}", self.action.name, direction, name),
                )
            })?;

        if let Some(variable) = self.service.state_variable(&argument.related_state_variable) {
            variable
                .parse_value(&value.to_string())
                .map_err(|(code, message)| ActionError::new(code, message))?;
        }

        Ok(argument.name.clone())
    }
}

fn upsert(values: &mut Vec<(String, Value)>, name: String, value: Value) {
    match values.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = value,
        None => values.push((name, value)),
    }
}

fn lookup<'a>(action: &Action, values: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    let canonical = action.argument(name).map(|a| a.name.as_str()).unwrap_or(name);
    values.iter().find(|(n, _)| n == canonical).map(|(_, v)| v)
}
