/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
pub mod common {
    pub mod push_provider;
    #[cfg(test)]
    pub mod test_doubles;
    pub mod token_store;
    pub mod types;
    pub mod utils;
}
pub mod domain {
    pub mod action {
        pub mod internal {
            pub mod notification;
        }
    }
    pub mod api;
    pub mod types {
        pub mod internal {
            pub mod notification;
        }
        pub mod ui {
            pub mod healthcheck;
        }
    }
}
pub mod environment;
pub mod middleware;
pub mod outbound {
    pub mod external;
    pub mod types;
}
pub mod redis {
    pub mod commands;
    pub mod keys;
    pub mod types;
}
pub mod tools {
    pub mod callapi;
    pub mod error;
    pub mod logger;
    pub mod prometheus;
}
