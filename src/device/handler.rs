//! Prompt/state-machine core shared by every vendor driver.
//!
//! `DeviceHandler` tracks which named state a device's terminal session is
//! currently in (based on matching the last line of output against a
//! combined `RegexSet`) and can compute the command sequence needed to
//! reach another named state via breadth-first search over a transition
//! graph. Vendor differences are pure data fed into this one generic
//! engine; see [`crate::device::drivers`] for the per-vendor builders.

use std::collections::{HashMap, HashSet, VecDeque};

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::error::ConnectError;

pub struct DeviceHandler {
    current_state_index: usize,
    all_states: Vec<String>,
    all_regex: RegexSet,
    regex_index_map: HashMap<usize, usize>,
    prompt_index: (usize, usize),
    sys_prompt_index: (usize, usize),
    input_map: HashMap<String, (bool, String, bool)>,
    edges: Vec<(String, String, String, bool, bool)>,
    ignore_errors: Option<RegexSet>,
    pub dyn_param: HashMap<String, String>,
    catch_map: HashMap<usize, (Regex, String)>,
    sys: Option<String>,
}

static PRE_STATE: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        "Output".to_string(),
        "More".to_string(),
        "Error".to_string(),
    ]
});

impl DeviceHandler {
    /// Builds a handler from vendor data. Fails only if a supplied pattern
    /// does not compile, which every driver builder propagates rather than
    /// panicking on (unlike a hand-rolled regex literal, vendor tables are
    /// data and deserve a typed error).
    pub fn new<I, S>(
        prompt: Vec<(String, I)>,
        prompt_with_sys: Vec<(String, S, String)>,
        write: Vec<(String, (bool, String, bool), I)>,
        more_regex: I,
        error_regex: I,
        edges: Vec<(String, String, String, bool, bool)>,
        ignore_errors: I,
        dyn_param: HashMap<String, String>,
    ) -> Result<DeviceHandler, ConnectError>
    where
        S: AsRef<str> + Clone,
        I: IntoIterator<Item = S>,
    {
        let mut all_states: Vec<String> = PRE_STATE.iter().map(|s| s.to_string()).collect();

        let mut regexs: Vec<S> = Vec::new();
        let mut regex_index_map = HashMap::new();

        let start_offset = regexs.len();
        regexs.extend(more_regex);
        for i in start_offset..regexs.len() {
            regex_index_map.insert(i, 1);
        }

        let start_offset = regexs.len();
        regexs.extend(error_regex);
        for i in start_offset..regexs.len() {
            regex_index_map.insert(i, 2);
        }

        for (state, regex_iter) in prompt {
            let state_index = all_states.len();
            all_states.push(state);

            let start_offset = regexs.len();
            regexs.extend(regex_iter);

            for i in start_offset..regexs.len() {
                regex_index_map.insert(i, state_index);
            }
        }

        let mut catch_map = HashMap::new();
        let sys_prompt_state_index = all_states.len();

        for (state, regex, catch) in prompt_with_sys {
            let state_index = all_states.len();
            all_states.push(state.clone());

            let start_offset = regexs.len();
            let compiled = Regex::new(regex.as_ref())
                .map_err(|e| ConnectError::InvalidDeviceHandlerConfig(e.to_string()))?;
            catch_map.insert(start_offset, (compiled, catch));
            regexs.push(regex);
            regex_index_map.insert(start_offset, state_index);
        }

        let sys_prompt_index = (sys_prompt_state_index, all_states.len().max(1) - 1);
        let prompt_index = (3, all_states.len().max(4) - 1);

        let mut input_map = HashMap::new();
        for (state, cmd, regex_iter) in write {
            let state_index = all_states.len();
            all_states.push(state.clone());

            let start_offset = regexs.len();
            regexs.extend(regex_iter);
            input_map.insert(state, cmd);

            for i in start_offset..regexs.len() {
                regex_index_map.insert(i, state_index);
            }
        }

        input_map.insert("More".to_string(), (false, " ".to_string(), false));

        let all_regex = RegexSet::new(&regexs)
            .map_err(|e| ConnectError::InvalidDeviceHandlerConfig(e.to_string()))?;

        let mut ignore_iter = ignore_errors.into_iter().peekable();
        let ignore_errors = if ignore_iter.peek().is_none() {
            None
        } else {
            Some(
                RegexSet::new(ignore_iter)
                    .map_err(|e| ConnectError::InvalidDeviceHandlerConfig(e.to_string()))?,
            )
        };

        Ok(Self {
            current_state_index: 0,
            prompt_index,
            sys_prompt_index,
            all_states,
            all_regex,
            regex_index_map,
            input_map,
            edges,
            ignore_errors,
            dyn_param,
            catch_map,
            sys: None,
        })
    }

    fn line2state(&self, line: &str, need_catch: bool) -> (usize, &str, Option<String>) {
        let matches: Vec<_> = self.all_regex.matches(line).into_iter().collect();
        if matches.is_empty() {
            return (0, self.all_states.first().unwrap(), None);
        }
        let mut current_state_catch = None;
        let index = matches.first().unwrap();
        if need_catch {
            if let Some((regex, catch)) = self.catch_map.get(index) {
                if let Some(caps) = regex.captures(line) {
                    current_state_catch = caps.name(catch).map(|s| s.as_str().to_string());
                }
            }
        }
        let state_index = *self.regex_index_map.get(index).unwrap();
        (
            state_index,
            self.all_states.get(state_index).unwrap(),
            current_state_catch,
        )
    }

    pub fn read(&mut self, line: &str) {
        trace!("Read line: '{:?}'", line);
        let (state_index, state, catch) = self.line2state(line, true);
        trace!("Converted to state: '{:?}'", state);
        if self.ignore_error(line) {
            trace!("Ignoring error state");
            self.current_state_index = 0;
        } else {
            if self.match_prompt(state_index) {
                trace!("State captured value: '{:?}'", catch);
                self.sys = catch;
            }
            self.current_state_index = state_index;
        }
    }

    fn ignore_error(&self, line: &str) -> bool {
        match &self.ignore_errors {
            None => false,
            Some(set) => set.is_match(line),
        }
    }

    fn match_prompt(&self, index: usize) -> bool {
        let (start, end) = self.prompt_index;
        index >= start && index <= end
    }

    fn match_sys_prompt(&self, index: usize) -> bool {
        let (start, end) = self.sys_prompt_index;
        index >= start && index <= end
    }

    pub fn read_prompt(&mut self, line: &str) -> bool {
        let (index, _, _) = self.line2state(line, false);
        self.match_prompt(index)
    }

    pub fn read_sys_prompt(&mut self, line: &str) -> bool {
        let (index, _, _) = self.line2state(line, false);
        self.match_sys_prompt(index)
    }

    pub fn read_need_write(&mut self, line: &str) -> Option<(String, bool)> {
        let (_, input, _) = self.line2state(line, false);
        if let Some((is_dyn, s, is_record)) = self.input_map.get(input) {
            if *is_dyn {
                return self.dyn_param.get(s).map(|cmd| (cmd.clone(), *is_record));
            }
            return Some((s.clone(), *is_record));
        }
        None
    }

    pub fn current_state(&self) -> &str {
        self.all_states.get(self.current_state_index).unwrap()
    }

    /// Forces the tracked state without reading a prompt line. Used after a
    /// transition command from [`Self::trans_state_write`] succeeds: the
    /// destination state is already known from the computed path, so there
    /// is no need to re-classify the echoed prompt.
    pub fn set_state(&mut self, state: &str, sys: Option<String>) {
        if let Some(index) = self.all_states.iter().position(|s| s == state) {
            self.current_state_index = index;
        }
        if sys.is_some() {
            self.sys = sys;
        }
    }

    pub fn error(&self) -> bool {
        self.current_state().eq("Error")
    }

    fn exit_until_no_sys(
        &self,
        sys: Option<&String>,
    ) -> Result<Option<(&str, Vec<(String, String)>)>, ConnectError> {
        if !self.match_sys_prompt(self.current_state_index) {
            return Ok(None);
        }
        let exit_edges = self.edges.iter().filter(|(_, _, _, exit, _)| *exit);
        let mut edge_map = HashMap::new();
        for (start, cmd, end, _, format) in exit_edges {
            edge_map.insert(start, (cmd, end, format));
        }
        let mut path = Vec::new();
        let mut current = &self.current_state().to_string();
        loop {
            if let Some((cmd, end, format)) = edge_map.get(current) {
                path.push((Self::format_cmd(**format, cmd, sys), (*end).to_string()));
                if let Some(index) = self.all_states.iter().position(|v| v.eq(*end)) {
                    if !self.match_sys_prompt(index) {
                        return Ok(Some((*end, path)));
                    }
                    current = *end;
                } else {
                    return Err(ConnectError::TargetStateNotExistError);
                }
            } else {
                return Err(ConnectError::NoExitCommandError(current.clone()));
            }
        }
    }

    fn format_cmd(format: bool, cmd: &str, sys: Option<&String>) -> String {
        if format {
            match sys {
                Some(sys) => cmd.replace("{}", sys),
                None => String::new(),
            }
        } else {
            cmd.to_string()
        }
    }

    /// Breadth-first search for the shortest command path from the current
    /// state to `state`, crossing out of a system-scoped context first if
    /// the requested `sys` differs from the one currently captured.
    pub fn trans_state_write(
        &self,
        state: &str,
        sys: Option<&String>,
    ) -> Result<Vec<(String, String)>, ConnectError> {
        let mut start_node = self.current_state();
        let end_node = state;
        let mut switch_path = Vec::new();

        if let (Some(cur_sys), Some(want_sys)) = (&self.sys, sys) {
            if cur_sys != want_sys {
                if let Some((node, exit_path)) = self.exit_until_no_sys(sys)? {
                    start_node = node;
                    switch_path.extend(exit_path);
                }
            }
        }

        if start_node == end_node {
            return Ok(switch_path);
        }

        let mut adj_list: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (from, label, to, _, format) in &self.edges {
            adj_list
                .entry(from.clone())
                .or_default()
                .push((to.clone(), Self::format_cmd(*format, label, sys)));
        }

        let mut queue = VecDeque::new();
        queue.push_back(start_node.to_string());
        let mut visited = HashSet::new();
        visited.insert(start_node.to_string());
        let mut predecessors: HashMap<String, (String, String)> = HashMap::new();

        while let Some(current_node) = queue.pop_front() {
            if current_node == end_node {
                break;
            }
            if let Some(neighbors) = adj_list.get(&current_node) {
                for (neighbor_node, edge_label) in neighbors {
                    if !visited.contains(neighbor_node) {
                        visited.insert(neighbor_node.clone());
                        predecessors.insert(
                            neighbor_node.clone(),
                            (current_node.clone(), edge_label.clone()),
                        );
                        queue.push_back(neighbor_node.clone());
                    }
                }
            }
        }

        if !predecessors.contains_key(end_node) {
            return Err(ConnectError::UnreachableState(end_node.to_string()));
        }

        let mut current = end_node.to_string();
        let mut path = Vec::new();
        while &current != start_node {
            let (parent, edge_label) = predecessors
                .get(&current)
                .expect("reachable node has a predecessor");
            path.push((edge_label.clone(), current.clone()));
            current = parent.clone();
        }
        path.reverse();
        switch_path.extend(path);
        Ok(switch_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn cisco_like() -> DeviceHandler {
        DeviceHandler::new(
            vec![
                ("Config".to_string(), vec![r"^\S+\(\S+\)#\s*$"]),
                ("Enable".to_string(), vec![r"^[^\s#]+#\s*$"]),
                ("Login".to_string(), vec![r"^[^\s<]+>\s*$"]),
            ],
            Vec::<(String, &str, String)>::new(),
            Vec::<(String, (bool, String, bool), Vec<&str>)>::new(),
            vec![r"--More--"],
            vec![r"% Invalid"],
            vec![
                ("Login".to_string(), "enable".to_string(), "Enable".to_string(), false, false),
                ("Enable".to_string(), "configure terminal".to_string(), "Config".to_string(), false, false),
                ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
            ],
            Vec::<&str>::new(),
            Map::new(),
        )
        .unwrap()
    }

    #[test]
    fn read_updates_current_state_from_prompt() {
        let mut h = cisco_like();
        h.read("router>");
        assert_eq!(h.current_state(), "Login");
        h.read("router#");
        assert_eq!(h.current_state(), "Enable");
    }

    #[test]
    fn trans_state_write_finds_shortest_path() {
        let mut h = cisco_like();
        h.read("router>");
        let path = h.trans_state_write("Config", None).unwrap();
        assert_eq!(
            path,
            vec![
                ("enable".to_string(), "Enable".to_string()),
                ("configure terminal".to_string(), "Config".to_string()),
            ]
        );
    }

    #[test]
    fn trans_state_write_is_empty_when_already_there() {
        let mut h = cisco_like();
        h.read("router#");
        assert_eq!(h.trans_state_write("Enable", None).unwrap(), Vec::new());
    }

    #[test]
    fn unreachable_state_is_an_error() {
        let h = cisco_like();
        assert!(matches!(
            h.trans_state_write("Nonexistent", None),
            Err(ConnectError::UnreachableState(_))
        ));
    }
}
