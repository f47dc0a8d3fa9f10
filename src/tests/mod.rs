mod prelude;

mod redirection;
