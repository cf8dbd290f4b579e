use std::{fmt::Display, ops::Index};

use la_arena::{Arena, Idx};
use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::trace;

use crate::lex::{Token, TokenKind, TokenStream};

/// Deepest parenthesis nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

#[derive(Error, Debug, Diagnostic)]
#[error("SyntaxError: {message}")]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    pub location: String,
    pub message: String,
}

impl SyntaxError {
    fn at(ast: &Ast<'_>, token: &Token<'_>, message: &str) -> Self {
        SyntaxError {
            src: NamedSource::new(ast.filename, ast.source.to_string()),
            bad_bit: token.span,
            location: token.location.to_string(),
            message: message.to_string(),
        }
    }
}

pub type NodeId<'de> = Idx<Node<'de>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    /// A parenthesized group.
    Expr,
    /// A plain identifier followed directly by `(`. Its only child is the [`NodeKind::Args`] list.
    Call,
    Args,
    /// A name preceded by a type keyword. The first child wraps the type keyword.
    Declaration,
    /// Holds the assigned node as its only child.
    Assignment,
    Value,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Root => "Root",
            NodeKind::Expr => "Expr",
            NodeKind::Call => "Call",
            NodeKind::Args => "Args",
            NodeKind::Declaration => "Declaration",
            NodeKind::Assignment => "Assignment",
            NodeKind::Value => "Value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node<'de> {
    pub kind: NodeKind,
    pub token: Option<Token<'de>>,
    children: Vec<NodeId<'de>>,
    parent: Option<NodeId<'de>>,
}

impl<'de> Node<'de> {
    pub fn children(&self) -> &[NodeId<'de>] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId<'de>> {
        self.parent
    }

    /// The text of the node's token, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.token.as_ref().and_then(|token| token.text.as_deref())
    }
}

/// A syntax tree whose nodes live in one arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast<'de> {
    filename: &'de str,
    source: &'de str,
    nodes: Arena<Node<'de>>,
    root: NodeId<'de>,
}

impl<'de> Ast<'de> {
    pub(crate) fn new(filename: &'de str, source: &'de str) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node {
            kind: NodeKind::Root,
            token: None,
            children: Vec::new(),
            parent: None,
        });
        Ast {
            filename,
            source,
            nodes,
            root,
        }
    }

    pub fn filename(&self) -> &'de str {
        self.filename
    }

    pub fn source(&self) -> &'de str {
        self.source
    }

    pub fn root(&self) -> NodeId<'de> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id` in order.
    pub fn children(&self, id: NodeId<'de>) -> impl Iterator<Item = &Node<'de>> {
        self[id].children.iter().map(|&child| &self[child])
    }

    pub(crate) fn push(
        &mut self,
        parent: NodeId<'de>,
        kind: NodeKind,
        token: Option<Token<'de>>,
    ) -> NodeId<'de> {
        let id = self.nodes.alloc(Node {
            kind,
            token,
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Moves `id` to the end of `parent`'s children.
    pub(crate) fn reparent(&mut self, id: NodeId<'de>, parent: NodeId<'de>) {
        if let Some(old) = self.nodes[id].parent {
            self.nodes[old].children.retain(|&child| child != id);
        }
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.push(id);
    }

    fn write_node(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        id: NodeId<'de>,
        depth: usize,
    ) -> std::fmt::Result {
        let node = &self[id];
        write!(f, "{:indent$}{}", "", node.kind, indent = depth * 2)?;
        if let Some(token) = &node.token {
            match (&token.kind, &token.text) {
                (TokenKind::String, Some(text)) => write!(f, " {text:?}")?,
                (_, Some(text)) => write!(f, " {text}")?,
                (_, None) => {}
            }
        }
        writeln!(f)?;
        for &child in &node.children {
            self.write_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl<'de> Index<NodeId<'de>> for Ast<'de> {
    type Output = Node<'de>;

    fn index(&self, id: NodeId<'de>) -> &Self::Output {
        &self.nodes[id]
    }
}

impl Display for Ast<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_node(f, self.root(), 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Args,
    Expr,
}

/// A parenthesis that has been opened but not yet closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<'de> {
    pub kind: GroupKind,
    pub node: NodeId<'de>,
    /// Where new nodes go again once the group closes.
    pub enclosing: NodeId<'de>,
    pub open: Token<'de>,
}

/// Everything the parser remembers between two tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseState<'de> {
    pub insertion: NodeId<'de>,
    pub scope_root: NodeId<'de>,
    /// The last identifier node, until it becomes a call or an assignment target.
    pub pending: Option<NodeId<'de>>,
    pub groups: Vec<Group<'de>>,
    pub previous: Option<Token<'de>>,
}

impl<'de> ParseState<'de> {
    pub fn new(root: NodeId<'de>) -> Self {
        ParseState {
            insertion: root,
            scope_root: root,
            pending: None,
            groups: Vec::new(),
            previous: None,
        }
    }

    pub fn inside_args(&self) -> bool {
        self.groups
            .last()
            .is_some_and(|group| group.kind == GroupKind::Args)
    }

    pub fn inside_grouped_expr(&self) -> bool {
        self.groups
            .last()
            .is_some_and(|group| group.kind == GroupKind::Expr)
    }

    fn previous_kind(&self) -> Option<TokenKind> {
        self.previous.as_ref().map(|token| token.kind)
    }
}

pub struct Parser<'de> {
    tokens: std::vec::IntoIter<Token<'de>>,
    ast: Ast<'de>,
}

/// Builds the syntax tree for a whole token stream.
pub fn parse(tokens: TokenStream<'_>) -> Result<Ast<'_>, Error> {
    Parser::new(tokens).parse()
}

impl<'de> Parser<'de> {
    pub fn new(tokens: TokenStream<'de>) -> Self {
        Parser {
            ast: Ast::new(tokens.filename(), tokens.source()),
            tokens: tokens.into_iter(),
        }
    }

    pub fn ast(&self) -> &Ast<'de> {
        &self.ast
    }

    pub fn parse(mut self) -> Result<Ast<'de>, Error> {
        let mut state = ParseState::new(self.ast.root());
        while let Some(token) = self.tokens.next() {
            if token.kind == TokenKind::Eof {
                if let Some(group) = state.groups.last() {
                    return Err(
                        SyntaxError::at(&self.ast, &group.open, "unclosed parenthesis").into(),
                    );
                }
                break;
            }
            state = self.step(state, token)?;
        }
        Ok(self.ast)
    }

    /// Applies one token to the tree and returns the state for the next one.
    pub fn step(
        &mut self,
        mut state: ParseState<'de>,
        token: Token<'de>,
    ) -> Result<ParseState<'de>, Error> {
        trace!(kind = ?token.kind, location = %token.location, "parse");
        match token.kind {
            TokenKind::Ident => {
                let node = match state.previous.take() {
                    Some(keyword) if keyword.kind == TokenKind::Type => {
                        let declaration = self.ast.push(
                            state.insertion,
                            NodeKind::Declaration,
                            Some(token.clone()),
                        );
                        self.ast
                            .push(declaration, NodeKind::Value, Some(keyword));
                        declaration
                    }
                    _ => self
                        .ast
                        .push(state.insertion, NodeKind::Value, Some(token.clone())),
                };
                state.pending = Some(node);
            }
            TokenKind::LeftParen => {
                if state.groups.len() >= MAX_NESTING {
                    return Err(SyntaxError::at(
                        &self.ast,
                        &token,
                        "parentheses are nested too deeply",
                    )
                    .into());
                }
                let callee = match state.previous_kind() {
                    Some(TokenKind::Ident) => state.pending.take(),
                    _ => None,
                };
                let (kind, node) = match callee {
                    Some(callee) if self.ast[callee].kind != NodeKind::Value => {
                        return Err(SyntaxError::at(
                            &self.ast,
                            &token,
                            "a declaration cannot be called",
                        )
                        .into());
                    }
                    Some(callee) => {
                        self.ast.nodes[callee].kind = NodeKind::Call;
                        let args = self.ast.push(callee, NodeKind::Args, Some(token.clone()));
                        (GroupKind::Args, args)
                    }
                    None => {
                        let expr =
                            self.ast
                                .push(state.insertion, NodeKind::Expr, Some(token.clone()));
                        (GroupKind::Expr, expr)
                    }
                };
                state.groups.push(Group {
                    kind,
                    node,
                    enclosing: state.insertion,
                    open: token.clone(),
                });
                state.insertion = node;
            }
            TokenKind::RightParen => {
                let Some(group) = state.groups.pop() else {
                    return Err(SyntaxError::at(
                        &self.ast,
                        &token,
                        "unmatched closing parenthesis",
                    )
                    .into());
                };
                state.insertion = group.enclosing;
                // nodes inside a closed group cannot be assigned to
                state.pending = None;
            }
            TokenKind::String | TokenKind::Int(_) => {
                self.ast
                    .push(state.insertion, NodeKind::Value, Some(token.clone()));
            }
            TokenKind::Equal => {
                let Some(target) = state.pending.take() else {
                    return Err(SyntaxError::at(
                        &self.ast,
                        &token,
                        "improper assignment: nothing to assign to",
                    )
                    .into());
                };
                let assignment =
                    self.ast
                        .push(state.insertion, NodeKind::Assignment, Some(token.clone()));
                self.ast.reparent(target, assignment);
            }
            TokenKind::Semicolon => {
                if let Some(group) = state.groups.last() {
                    return Err(
                        SyntaxError::at(&self.ast, &group.open, "unclosed parenthesis").into(),
                    );
                }
                state.insertion = state.scope_root;
                state.pending = None;
            }
            // a type keyword only matters to the identifier after it
            TokenKind::Type | TokenKind::Eof => {}
        }
        state.previous = Some(token);
        Ok(state)
    }
}
